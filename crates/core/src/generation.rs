use crate::config::ProviderConfig;
use crate::error::GenerationError;
use crate::gemini::{is_quota_failure, model_endpoint, PROVIDER};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
}

/// A single-shot text generation service. No streaming, no conversation memory.
pub trait Generator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

impl<G: Generator + ?Sized> Generator for &G {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        (**self).generate(request)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    config: ProviderConfig,
    client: Client,
}

impl GeminiGenerator {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

impl Generator for GeminiGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: &request.system,
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: &request.user,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
            },
        };

        let endpoint = model_endpoint(
            &self.config.base_url,
            &self.config.generation_model,
            "generateContent",
        )?;
        debug!(
            provider = PROVIDER,
            model = %self.config.generation_model,
            prompt_chars = request.user.len(),
            "generating"
        );

        let response = self
            .client
            .post(endpoint)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().unwrap_or_default();
            error!(provider = PROVIDER, status = %status, "generation request failed");
            return Err(if is_quota_failure(status, &details) {
                GenerationError::QuotaExceeded {
                    provider: PROVIDER.to_string(),
                    details: format!("{status}: {details}"),
                }
            } else {
                GenerationError::Upstream {
                    provider: PROVIDER.to_string(),
                    details: format!("{status}: {details}"),
                }
            });
        }

        let parsed: GenerateContentResponse = response.json()?;
        text_from_response(parsed)
    }
}

fn text_from_response(response: GenerateContentResponse) -> Result<String, GenerationError> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenerationError::EmptyResponse(
            "first candidate had no text parts".to_string(),
        ));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_parts_are_concatenated() -> Result<(), Box<dyn std::error::Error>> {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Jane has "},{"text":"5 years."}]}}]}"#,
        )?;
        assert_eq!(text_from_response(response)?, "Jane has 5 years.");
        Ok(())
    }

    #[test]
    fn blocked_or_empty_candidates_are_errors() -> Result<(), Box<dyn std::error::Error>> {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#)?;
        assert!(matches!(
            text_from_response(response),
            Err(GenerationError::EmptyResponse(_))
        ));
        Ok(())
    }

    #[test]
    fn request_body_carries_system_instruction_and_temperature() -> Result<(), serde_json::Error> {
        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: "be brief" }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: "hi" }],
            }],
            generation_config: GenerationConfig { temperature: 0.5 },
        };
        let json = serde_json::to_value(&body)?;
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["generationConfig"]["temperature"], 0.5);
        Ok(())
    }
}
