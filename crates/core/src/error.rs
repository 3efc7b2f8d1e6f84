use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required credential: {0}")]
    MissingCredential(String),

    #[error("invalid setting {name}: {details}")]
    InvalidSetting { name: String, details: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("docx parse error: {0}")]
    DocxParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("conversion failed: {0}")]
    Conversion(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding quota exceeded at {provider}: {details}")]
    QuotaExceeded { provider: String, details: String },

    #[error("invalid response from {provider}: {details}")]
    Upstream { provider: String, details: String },

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation quota exceeded at {provider}: {details}")]
    QuotaExceeded { provider: String, details: String },

    #[error("invalid response from {provider}: {details}")]
    Upstream { provider: String, details: String },

    #[error("generation returned no text: {0}")]
    EmptyResponse(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedding dimension {found} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("embedding count {embeddings} doesn't match chunk count {chunks}")]
    CountMismatch { chunks: usize, embeddings: usize },

    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt index at {path}: {details}")]
    Corrupt { path: String, details: String },

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, IndexError::QuotaExceeded(_))
    }
}

impl From<EmbeddingError> for IndexError {
    fn from(error: EmbeddingError) -> Self {
        match error {
            EmbeddingError::QuotaExceeded { .. } => IndexError::QuotaExceeded(error.to_string()),
            other => IndexError::Embedding(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("index not available yet: {0}")]
    NotReady(String),

    #[error("query is empty")]
    EmptyQuery,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("malformed model output for {subject}: {details}")]
    MalformedOutput { subject: String, details: String },

    #[error("invalid field {field} for {subject}: {details}")]
    InvalidField {
        subject: String,
        field: String,
        details: String,
    },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("failed to write report to {path}: {details}")]
    Report { path: String, details: String },
}

impl AnalysisError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(
            self,
            AnalysisError::Generation(GenerationError::QuotaExceeded { .. })
        )
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline not initialized; call initialize first")]
    NotInitialized,

    #[error("pipeline is rebuilding its index; retry once the rebuild finishes")]
    Rebuilding,

    #[error("pipeline failed during its last initialization: {0}")]
    Failed(String),

    #[error("no documents loaded from {0}")]
    NoDocuments(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl PipelineError {
    /// True for the invalid-call-sequence errors, as opposed to data or upstream failures.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            PipelineError::NotInitialized
                | PipelineError::Rebuilding
                | PipelineError::Failed(_)
                | PipelineError::Search(SearchError::NotReady(_))
        )
    }

    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            PipelineError::Index(error) => error.is_quota_exceeded(),
            PipelineError::Search(SearchError::Embedding(EmbeddingError::QuotaExceeded { .. })) => {
                true
            }
            PipelineError::Generation(GenerationError::QuotaExceeded { .. }) => true,
            _ => false,
        }
    }
}
