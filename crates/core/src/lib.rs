pub mod analysis;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod gemini;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod retriever;
pub mod synthesizer;

pub use analysis::{
    build_report, select_best, write_report, CandidateBatch, CvAnalyzer,
    DEFAULT_JOB_REQUIREMENTS, DEFAULT_REPORT_FILE,
};
pub use chunking::{chunk_document, chunk_documents, split_text, ChunkingConfig, TextWindow};
pub use config::{PipelineConfig, ProviderConfig};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, GeminiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    AnalysisError, ConfigError, EmbeddingError, GenerationError, IndexError, IngestError,
    PipelineError, SearchError,
};
pub use extractor::{DocumentConverter, LocalConverter, RemoteConverter, SUPPORTED_EXTENSIONS};
pub use generation::{GeminiGenerator, GenerationRequest, Generator};
pub use index::VectorIndex;
pub use ingest::{discover_cv_files, load_documents, LoadReport, SkippedFile};
pub use models::{
    AnalysisReport, AnswerResult, CandidateAnalysis, CandidateRanking, Chunk, EmbeddingRecord,
    FailedCandidate, Recommendation, ScoredChunk, SourceDocument, SourceSummary,
};
pub use orchestrator::{InitOutcome, PipelineState, RagPipeline};
pub use retriever::Retriever;
pub use synthesizer::AnswerSynthesizer;
