use crate::config::ProviderConfig;
use crate::error::EmbeddingError;
use crate::gemini::{is_quota_failure, model_endpoint, PROVIDER};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Largest batch the hosted embedding endpoint accepts in one request.
pub const MAX_REMOTE_BATCH: usize = 100;

pub trait Embedder {
    /// Identifies the vector space; indexes built with another model are not reused.
    fn model_name(&self) -> &str;

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_documents(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::MalformedResponse("no vector for query".to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn model_name(&self) -> &str {
        "character-ngram"
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Hosted embeddings through the `batchEmbedContents` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    config: ProviderConfig,
    client: Client,
}

impl GeminiEmbedder {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn request(&self, texts: &[&str], task_type: &'static str) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = format!(
            "models/{}",
            self.config.embedding_model.trim_start_matches("models/")
        );
        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: model.clone(),
                    content: Content {
                        parts: vec![Part { text }],
                    },
                    task_type,
                })
                .collect(),
        };

        let endpoint = model_endpoint(
            &self.config.base_url,
            &self.config.embedding_model,
            "batchEmbedContents",
        )?;
        debug!(provider = PROVIDER, batch_size = texts.len(), task_type, "embedding batch");

        let response = self
            .client
            .post(endpoint)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().unwrap_or_default();
            error!(provider = PROVIDER, status = %status, "embedding request failed");
            return Err(classify_failure(status, details));
        }

        let parsed: BatchEmbedResponse = response.json()?;
        vectors_from_response(parsed, texts.len())
    }
}

fn classify_failure(status: reqwest::StatusCode, details: String) -> EmbeddingError {
    if is_quota_failure(status, &details) {
        EmbeddingError::QuotaExceeded {
            provider: PROVIDER.to_string(),
            details: format!("{status}: {details}"),
        }
    } else {
        EmbeddingError::Upstream {
            provider: PROVIDER.to_string(),
            details: format!("{status}: {details}"),
        }
    }
}

fn vectors_from_response(
    response: BatchEmbedResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if response.embeddings.len() != expected {
        return Err(EmbeddingError::MalformedResponse(format!(
            "expected {expected} embeddings, received {}",
            response.embeddings.len()
        )));
    }
    Ok(response
        .embeddings
        .into_iter()
        .map(|embedding| embedding.values)
        .collect())
}

impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.config.embedding_model
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_REMOTE_BATCH) {
            vectors.extend(self.request(batch, "RETRIEVAL_DOCUMENT")?);
        }
        Ok(vectors)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.request(&[text], "RETRIEVAL_QUERY")?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::MalformedResponse("no vector for query".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Senior Python engineer");
        let second = embedder.embed("Senior Python engineer");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc");
        assert_eq!(vector.len(), 32);
    }

    #[test]
    fn query_embedding_matches_document_embedding() -> Result<(), EmbeddingError> {
        let embedder = CharacterNgramEmbedder::default();
        let documents = embedder.embed_documents(&["rust", "python"])?;
        assert_eq!(documents.len(), 2);
        assert_eq!(embedder.embed_query("python")?, documents[1]);
        Ok(())
    }

    #[test]
    fn batch_response_must_match_request_size() {
        let response: BatchEmbedResponse =
            serde_json::from_str(r#"{"embeddings":[{"values":[0.1,0.2]}]}"#)
                .expect("valid response json");
        assert!(matches!(
            vectors_from_response(response, 2),
            Err(EmbeddingError::MalformedResponse(_))
        ));
    }

    #[test]
    fn quota_responses_become_quota_errors() {
        let error = classify_failure(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#.to_string(),
        );
        assert!(matches!(error, EmbeddingError::QuotaExceeded { .. }));

        let error = classify_failure(StatusCode::BAD_GATEWAY, "upstream down".to_string());
        assert!(matches!(error, EmbeddingError::Upstream { .. }));
    }

    #[test]
    fn request_body_uses_camel_case_fields() -> Result<(), serde_json::Error> {
        let body = BatchEmbedRequest {
            requests: vec![EmbedContentRequest {
                model: "models/gemini-embedding-001".to_string(),
                content: Content {
                    parts: vec![Part { text: "hello" }],
                },
                task_type: "RETRIEVAL_DOCUMENT",
            }],
        };
        let json = serde_json::to_value(&body)?;
        assert_eq!(json["requests"][0]["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(json["requests"][0]["content"]["parts"][0]["text"], "hello");
        Ok(())
    }
}
