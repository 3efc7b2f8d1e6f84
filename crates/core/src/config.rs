use crate::chunking::ChunkingConfig;
use crate::error::ConfigError;
use std::path::PathBuf;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.0-flash-lite";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cv_folder: PathBuf,
    pub chunking: ChunkingConfig,
    pub index_path: PathBuf,
    pub top_k: usize,
    pub embed_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cv_folder: PathBuf::from("cv"),
            chunking: ChunkingConfig::default(),
            index_path: PathBuf::from("cv_vector_store"),
            top_k: 4,
            embed_batch_size: 100,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "top_k".to_string(),
                details: "must be at least 1".to_string(),
            });
        }
        if self.embed_batch_size == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "embed_batch_size".to_string(),
                details: "must be at least 1".to_string(),
            });
        }
        self.chunking
            .validate()
            .map_err(|error| ConfigError::InvalidSetting {
                name: "chunking".to_string(),
                details: error.to_string(),
            })
    }
}

/// Credentials and model selection for the hosted embedding and generation services.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub temperature: f32,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(ConfigError::MissingCredential("GOOGLE_API_KEY".to_string()));
        }

        Ok(Self {
            api_key,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            temperature: 0.7,
        })
    }

    /// Reads `GOOGLE_API_KEY` plus the optional `GEMINI_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = non_empty_env("GOOGLE_API_KEY")
            .ok_or_else(|| ConfigError::MissingCredential("GOOGLE_API_KEY".to_string()))?;
        let mut config = Self::new(api_key)?;

        if let Some(base_url) = non_empty_env("GEMINI_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(model) = non_empty_env("GEMINI_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(model) = non_empty_env("GEMINI_GENERATION_MODEL") {
            config.generation_model = model;
        }

        Ok(config)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

pub(crate) fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let value = value.trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
