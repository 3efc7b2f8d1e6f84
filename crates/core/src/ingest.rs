use crate::error::IngestError;
use crate::extractor::{file_extension, is_supported, DocumentConverter};
use crate::models::SourceDocument;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Supported files directly inside `folder`, sorted by path.
pub fn discover_cv_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if entry.file_type().is_file() && is_supported(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub documents: Vec<SourceDocument>,
    pub skipped_files: Vec<SkippedFile>,
}

/// Converts every supported file in `folder`. A file that fails to convert is
/// logged and recorded in `skipped_files`; the rest still load.
pub fn load_documents<C>(folder: &Path, converter: &C) -> LoadReport
where
    C: DocumentConverter + ?Sized,
{
    info!(folder = %folder.display(), "loading documents");

    if !folder.is_dir() {
        warn!(folder = %folder.display(), "cv folder not found");
        return LoadReport::default();
    }

    let mut report = LoadReport::default();

    for path in discover_cv_files(folder) {
        match load_document(&path, converter) {
            Ok(document) => {
                info!(source = %document.source_name, chars = document.char_count(), "loaded document");
                report.documents.push(document);
            }
            Err(failure) => {
                error!(path = %path.display(), error = %failure, "failed to load document");
                report.skipped_files.push(SkippedFile {
                    path,
                    reason: failure.to_string(),
                });
            }
        }
    }

    info!(
        documents = report.documents.len(),
        skipped = report.skipped_files.len(),
        "finished loading documents"
    );
    report
}

fn load_document<C>(path: &Path, converter: &C) -> Result<SourceDocument, IngestError>
where
    C: DocumentConverter + ?Sized,
{
    let source_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    let text = converter.convert(path)?;
    if text.trim().is_empty() {
        return Err(IngestError::Conversion(format!(
            "no readable text in {}",
            path.display()
        )));
    }

    Ok(SourceDocument {
        text,
        source_name: source_name.to_string(),
        source_path: path.to_string_lossy().to_string(),
        file_type: file_extension(path)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default(),
    })
}
