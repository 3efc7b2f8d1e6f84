use crate::config::non_empty_env;
use crate::error::IngestError;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use regex::Regex;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};
use zip::ZipArchive;

/// Extensions the loader accepts, lowercase and without the dot.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["pdf", "docx", "doc", "txt", "md"];

pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn is_supported(path: &Path) -> bool {
    file_extension(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Turns a document on disk into plain text.
pub trait DocumentConverter {
    fn convert(&self, path: &Path) -> Result<String, IngestError>;
}

#[derive(Debug, Clone, Serialize)]
struct ConvertRequest {
    file_base64: String,
    file_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ConvertResponse {
    #[serde(default)]
    pages: Option<Vec<ConvertedPage>>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ConvertedPage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

/// An HTTP document-conversion service that accepts base64 file bodies.
#[derive(Debug, Clone)]
pub struct RemoteConverter {
    pub endpoint: String,
    pub api_key: Option<String>,
    client: Client,
}

impl RemoteConverter {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            client: Client::new(),
        }
    }

    /// Reads `CONVERTER_ENDPOINT` and the optional `CONVERTER_API_KEY`.
    pub fn from_env() -> Option<Self> {
        let endpoint = non_empty_env("CONVERTER_ENDPOINT")?;
        Some(Self::new(endpoint, non_empty_env("CONVERTER_API_KEY")))
    }
}

impl DocumentConverter for RemoteConverter {
    fn convert(&self, path: &Path) -> Result<String, IngestError> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;
        let payload = ConvertRequest {
            file_base64: STANDARD.encode(bytes),
            file_name: file_name.to_string(),
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            return Err(IngestError::Conversion(format!(
                "conversion request to {} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        let payload: ConvertResponse = response.json()?;
        payload_to_text(&payload, path)
    }
}

fn payload_to_text(payload: &ConvertResponse, path: &Path) -> Result<String, IngestError> {
    if let Some(listed) = &payload.pages {
        let mut pages = listed
            .iter()
            .enumerate()
            .filter_map(|(index, page)| {
                let text = page.text.as_deref().map(str::trim).unwrap_or_default();
                if text.is_empty() {
                    None
                } else {
                    Some((page.page.unwrap_or(index as u32 + 1), text))
                }
            })
            .collect::<Vec<_>>();
        pages.sort_by_key(|(number, _)| *number);

        if !pages.is_empty() {
            return Ok(pages
                .into_iter()
                .map(|(_, text)| text)
                .collect::<Vec<_>>()
                .join("\n\n"));
        }
    }

    if let Some(text) = &payload.text {
        let text = text.trim();
        if !text.is_empty() {
            return Ok(text.to_string());
        }
    }

    Err(IngestError::Conversion(format!(
        "conversion response was empty for {}",
        path.display()
    )))
}

/// Plain text, PDFs and `.docx` files are converted in-process. Legacy `.doc`
/// files go to the remote converter when one is configured, as do PDFs and
/// `.docx` files that cannot be read locally.
#[derive(Debug, Clone, Default)]
pub struct LocalConverter {
    remote: Option<RemoteConverter>,
}

impl LocalConverter {
    pub fn new(remote: Option<RemoteConverter>) -> Self {
        Self { remote }
    }

    pub fn from_env() -> Self {
        Self::new(RemoteConverter::from_env())
    }

    fn convert_remote(
        &self,
        path: &Path,
        local_error: Option<IngestError>,
    ) -> Result<String, IngestError> {
        match (&self.remote, local_error) {
            (Some(remote), None) => remote.convert(path),
            (Some(remote), Some(local_error)) => {
                warn!(path = %path.display(), error = %local_error, "local extraction failed, using remote converter");
                remote.convert(path).map_err(|remote_error| {
                    IngestError::Conversion(format!(
                        "{local_error}; remote conversion fallback failed: {remote_error}"
                    ))
                })
            }
            (None, Some(local_error)) => Err(local_error),
            (None, None) => Err(IngestError::Conversion(format!(
                "no converter configured for {} (set CONVERTER_ENDPOINT)",
                path.display()
            ))),
        }
    }
}

impl DocumentConverter for LocalConverter {
    fn convert(&self, path: &Path) -> Result<String, IngestError> {
        let extension = file_extension(path).unwrap_or_default();
        debug!(path = %path.display(), extension = %extension, "converting document");

        match extension.as_str() {
            "txt" | "md" => {
                let bytes = std::fs::read(path)?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            "pdf" => match extract_pdf_text(path) {
                Ok(text) => Ok(text),
                Err(parse_error @ IngestError::PdfParse(_)) => {
                    self.convert_remote(path, Some(parse_error))
                }
                Err(error) => Err(error),
            },
            "docx" => match extract_docx_text(path) {
                Ok(text) => Ok(text),
                Err(parse_error @ IngestError::DocxParse(_)) => {
                    self.convert_remote(path, Some(parse_error))
                }
                Err(error) => Err(error),
            },
            "doc" => self.convert_remote(path, None),
            other => Err(IngestError::UnsupportedFileType(other.to_string())),
        }
    }
}

pub fn extract_pdf_text(path: &Path) -> Result<String, IngestError> {
    let document =
        Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;

        if !text.trim().is_empty() {
            pages.push(text.trim().to_string());
        }
    }

    if pages.is_empty() {
        return Err(IngestError::PdfParse(format!(
            "pdf had no readable page text: {}",
            path.display()
        )));
    }

    Ok(pages.join("\n\n"))
}

const DOCX_BODY: &str = "word/document.xml";

fn docx_token_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|</w:p>|<w:tab/>|<w:br/>|<w:cr/>").ok()
        })
        .as_ref()
}

/// Reads the body text of an Office Open XML document: text runs in order,
/// one line per paragraph.
pub fn extract_docx_text(path: &Path) -> Result<String, IngestError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|error| IngestError::DocxParse(format!("{}: {error}", path.display())))?;
    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|error| IngestError::DocxParse(format!("{}: {error}", path.display())))?
        .read_to_string(&mut xml)?;

    let text = docx_xml_to_text(&xml)?;
    if text.trim().is_empty() {
        return Err(IngestError::DocxParse(format!(
            "docx had no readable text: {}",
            path.display()
        )));
    }
    Ok(text)
}

fn docx_xml_to_text(xml: &str) -> Result<String, IngestError> {
    let pattern = docx_token_pattern()
        .ok_or_else(|| IngestError::DocxParse("docx token pattern failed to compile".to_string()))?;

    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    for captures in pattern.captures_iter(xml) {
        match (captures.get(1), captures.get(0).map(|token| token.as_str())) {
            (Some(run), _) => line.push_str(&unescape_xml(run.as_str())),
            (None, Some("</w:p>")) => lines.push(std::mem::take(&mut line)),
            (None, Some("<w:tab/>")) => line.push('\t'),
            (None, _) => line.push('\n'),
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }

    Ok(lines
        .iter()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string())
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
