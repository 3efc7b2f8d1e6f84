use crate::chunking::chunk_documents;
use crate::config::PipelineConfig;
use crate::embeddings::Embedder;
use crate::error::{ConfigError, PipelineError};
use crate::extractor::DocumentConverter;
use crate::generation::Generator;
use crate::index::VectorIndex;
use crate::ingest::load_documents;
use crate::models::{AnswerResult, ScoredChunk, SourceDocument, SourceSummary};
use crate::retriever::Retriever;
use crate::synthesizer::AnswerSynthesizer;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    Rebuilding,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// A persisted index was loaded; no document was read or embedded.
    Reused { chunks: usize },
    Rebuilt {
        documents: usize,
        skipped_files: usize,
        chunks: usize,
    },
}

/// Wires loading, chunking, indexing, retrieval and answer generation together.
///
/// `initialize` takes `&mut self` and `query` takes `&self`, so a query can
/// never observe a rebuild in progress within one process. The `Rebuilding`
/// state is still checked and rejected as a usage error.
pub struct RagPipeline<C, E, G> {
    config: PipelineConfig,
    converter: C,
    embedder: E,
    synthesizer: AnswerSynthesizer<G>,
    state: PipelineState,
    index: Option<VectorIndex>,
    documents: Vec<SourceDocument>,
    last_failure: Option<String>,
}

impl<C, E, G> RagPipeline<C, E, G>
where
    C: DocumentConverter,
    E: Embedder,
    G: Generator,
{
    pub fn new(
        config: PipelineConfig,
        converter: C,
        embedder: E,
        generator: G,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            cv_folder = %config.cv_folder.display(),
            index_path = %config.index_path.display(),
            model = embedder.model_name(),
            "rag pipeline created"
        );

        Ok(Self {
            config,
            converter,
            embedder,
            synthesizer: AnswerSynthesizer::new(generator),
            state: PipelineState::Uninitialized,
            index: None,
            documents: Vec::new(),
            last_failure: None,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Documents read during the last rebuild. Empty when the index was reused.
    pub fn documents(&self) -> &[SourceDocument] {
        &self.documents
    }

    /// Sources the current index was built from, also known after a reuse.
    pub fn sources(&self) -> &[SourceSummary] {
        self.index
            .as_ref()
            .map(VectorIndex::sources)
            .unwrap_or_default()
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn initialize(&mut self, rebuild: bool) -> Result<InitOutcome, PipelineError> {
        info!(rebuild, "initializing rag pipeline");

        if !rebuild {
            if let Some(index) = self.load_persisted() {
                let chunks = index.len();
                self.index = Some(index);
                self.documents.clear();
                self.state = PipelineState::Ready;
                self.last_failure = None;
                info!(chunks, "reusing persisted vector index");
                return Ok(InitOutcome::Reused { chunks });
            }
        }

        self.state = PipelineState::Rebuilding;
        self.index = None;
        self.documents.clear();

        match self.rebuild() {
            Ok(outcome) => {
                self.state = PipelineState::Ready;
                self.last_failure = None;
                info!(?outcome, "rag pipeline initialized");
                Ok(outcome)
            }
            Err(failure) => {
                error!(error = %failure, "rag pipeline initialization failed");
                self.state = PipelineState::Failed;
                self.index = None;
                self.documents.clear();
                self.last_failure = Some(failure.to_string());
                Err(failure)
            }
        }
    }

    fn load_persisted(&self) -> Option<VectorIndex> {
        match VectorIndex::load(&self.config.index_path) {
            Ok(Some(index)) if index.embedding_model() == self.embedder.model_name() => Some(index),
            Ok(Some(index)) => {
                warn!(
                    persisted = index.embedding_model(),
                    configured = self.embedder.model_name(),
                    "persisted index uses another embedding model, rebuilding"
                );
                None
            }
            Ok(None) => None,
            Err(failure) => {
                warn!(error = %failure, "persisted index unusable, rebuilding");
                None
            }
        }
    }

    fn rebuild(&mut self) -> Result<InitOutcome, PipelineError> {
        let report = load_documents(&self.config.cv_folder, &self.converter);
        if report.documents.is_empty() {
            return Err(PipelineError::NoDocuments(
                self.config.cv_folder.display().to_string(),
            ));
        }

        let chunks = chunk_documents(&report.documents, &self.config.chunking)?;
        let chunk_count = chunks.len();
        let sources = report
            .documents
            .iter()
            .map(SourceDocument::summary)
            .collect();

        let index = VectorIndex::build(chunks, sources, &self.embedder, self.config.embed_batch_size)?;
        index.save(&self.config.index_path)?;

        let outcome = InitOutcome::Rebuilt {
            documents: report.documents.len(),
            skipped_files: report.skipped_files.len(),
            chunks: chunk_count,
        };
        self.documents = report.documents;
        self.index = Some(index);
        Ok(outcome)
    }

    fn ensure_ready(&self) -> Result<(), PipelineError> {
        match self.state {
            PipelineState::Ready => Ok(()),
            PipelineState::Uninitialized => Err(PipelineError::NotInitialized),
            PipelineState::Rebuilding => Err(PipelineError::Rebuilding),
            PipelineState::Failed => Err(PipelineError::Failed(
                self.last_failure
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            )),
        }
    }

    pub fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>, PipelineError> {
        self.ensure_ready()?;
        let hits = Retriever::new(&self.embedder).search(
            self.index.as_ref(),
            question,
            self.config.top_k,
        )?;
        Ok(hits)
    }

    pub fn query(&self, question: &str) -> Result<AnswerResult, PipelineError> {
        info!(question, "processing query");
        let chunks = self
            .retrieve(question)?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect();
        let answer = self.synthesizer.synthesize(question, chunks)?;
        info!(cited = answer.cited_chunks.len(), "query processed");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::{GenerationError, IngestError};
    use crate::generation::GenerationRequest;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    struct ReadText;

    impl DocumentConverter for ReadText {
        fn convert(&self, path: &Path) -> Result<String, IngestError> {
            Ok(fs::read_to_string(path)?)
        }
    }

    struct Echo;

    impl Generator for Echo {
        fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            Ok(request.user.clone())
        }
    }

    fn pipeline(root: &Path) -> RagPipeline<ReadText, CharacterNgramEmbedder, Echo> {
        let config = PipelineConfig {
            cv_folder: root.join("cv"),
            index_path: root.join("store"),
            ..PipelineConfig::default()
        };
        RagPipeline::new(config, ReadText, CharacterNgramEmbedder::default(), Echo)
            .expect("default config is valid")
    }

    #[test]
    fn query_before_initialize_is_a_usage_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pipeline = pipeline(dir.path());

        let failure = pipeline.query("anything").err().ok_or("query should fail")?;
        assert!(matches!(failure, PipelineError::NotInitialized));
        assert!(failure.is_usage_error());
        Ok(())
    }

    #[test]
    fn failed_rebuild_leaves_pipeline_failed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut pipeline = pipeline(dir.path());

        let failure = pipeline.initialize(true).err().ok_or("empty folder must fail")?;
        assert!(matches!(failure, PipelineError::NoDocuments(_)));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(pipeline.index().is_none());
        assert!(matches!(pipeline.query("q"), Err(PipelineError::Failed(_))));
        assert!(!dir.path().join("store").exists());
        Ok(())
    }

    #[test]
    fn successful_reinitialize_recovers_from_failure() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut pipeline = pipeline(dir.path());
        assert!(pipeline.initialize(false).is_err());

        fs::create_dir(dir.path().join("cv"))?;
        fs::write(dir.path().join("cv/jane.txt"), "Jane Doe, Rust engineer")?;

        let outcome = pipeline.initialize(false)?;
        assert_eq!(
            outcome,
            InitOutcome::Rebuilt {
                documents: 1,
                skipped_files: 0,
                chunks: 1
            }
        );
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(pipeline.documents().len(), 1);
        assert_eq!(pipeline.sources()[0].source_name, "jane.txt");
        assert!(pipeline.query("Who knows Rust?")?.text.contains("jane.txt"));
        Ok(())
    }

    struct Renamed(CharacterNgramEmbedder);

    impl Embedder for Renamed {
        fn model_name(&self) -> &str {
            "another-model"
        }

        fn embed_documents(
            &self,
            texts: &[&str],
        ) -> Result<Vec<Vec<f32>>, crate::error::EmbeddingError> {
            self.0.embed_documents(texts)
        }
    }

    #[test]
    fn index_from_another_model_is_rebuilt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::create_dir(dir.path().join("cv"))?;
        fs::write(dir.path().join("cv/jane.txt"), "Jane Doe, Rust engineer")?;

        let mut first = pipeline(dir.path());
        first.initialize(false)?;

        let config = PipelineConfig {
            cv_folder: dir.path().join("cv"),
            index_path: dir.path().join("store"),
            ..PipelineConfig::default()
        };
        let mut second = RagPipeline::new(
            config,
            ReadText,
            Renamed(CharacterNgramEmbedder::default()),
            Echo,
        )?;
        assert!(matches!(second.initialize(false)?, InitOutcome::Rebuilt { .. }));
        assert!(matches!(second.initialize(false)?, InitOutcome::Reused { chunks: 1 }));
        assert!(second.documents().is_empty());
        assert_eq!(second.sources().len(), 1);
        Ok(())
    }
}
