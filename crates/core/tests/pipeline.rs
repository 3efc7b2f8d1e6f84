use cv_rag_core::{
    chunk_document, chunk_documents, load_documents, CharacterNgramEmbedder, ChunkingConfig,
    DocumentConverter, Embedder, EmbeddingError, GenerationError, GenerationRequest, Generator,
    InitOutcome, IngestError, LocalConverter, PipelineConfig, PipelineError, PipelineState,
    RagPipeline, SourceDocument, VectorIndex,
};
use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tempfile::tempdir;

const JANE_CV: &str = "Jane Doe\nSenior Backend Engineer\n\n\
Summary: 5 years of Python experience building data pipelines and REST APIs.\n\n\
Education: BSc Mathematics, University of Lisbon, 2015.\n\n\
Hobbies: hiking, chess, film photography.";

#[derive(Clone, Default)]
struct CountingConverter {
    calls: Rc<Cell<usize>>,
}

impl DocumentConverter for CountingConverter {
    fn convert(&self, path: &Path) -> Result<String, IngestError> {
        self.calls.set(self.calls.get() + 1);
        Ok(fs::read_to_string(path)?)
    }
}

#[derive(Clone, Default)]
struct CountingEmbedder {
    document_batches: Rc<Cell<usize>>,
    inner: CharacterNgramEmbedder,
}

impl Embedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.document_batches.set(self.document_batches.get() + 1);
        self.inner.embed_documents(texts)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.inner.embed(text))
    }
}

/// Answers by naming the first source in the prompt context.
struct CitingGenerator;

impl Generator for CitingGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let source = request
            .user
            .split("**Source: ")
            .nth(1)
            .and_then(|rest| rest.split("**").next())
            .unwrap_or("no source");
        Ok(format!("According to {source}, the candidate has 5 years of Python experience."))
    }
}

fn config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        cv_folder: root.join("cv"),
        index_path: root.join("cv_vector_store"),
        chunking: ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 20,
        },
        top_k: 2,
        ..PipelineConfig::default()
    }
}

fn write_cv(root: &Path, name: &str, text: &str) -> std::io::Result<()> {
    fs::create_dir_all(root.join("cv"))?;
    fs::write(root.join("cv").join(name), text)
}

#[test]
fn folder_with_only_unsupported_files_loads_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("photo.png"), b"\x89PNG")?;
    fs::write(dir.path().join("data.csv"), "a,b")?;
    fs::write(dir.path().join("notes"), "no extension")?;

    let report = load_documents(dir.path(), &LocalConverter::default());
    assert!(report.documents.is_empty());
    assert!(report.skipped_files.is_empty());
    Ok(())
}

#[test]
fn short_document_is_one_chunk_equal_to_its_text() -> Result<(), IngestError> {
    let document = SourceDocument {
        text: "Jane Doe - Python".to_string(),
        source_name: "jane.txt".to_string(),
        source_path: "cv/jane.txt".to_string(),
        file_type: ".txt".to_string(),
    };
    let chunks = chunk_documents(std::slice::from_ref(&document), &ChunkingConfig::default())?;
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, document.text);
    assert_eq!(chunks[0].start_offset, Some(0));
    Ok(())
}

#[test]
fn reloaded_index_answers_with_the_same_ordering() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let document = SourceDocument {
        text: JANE_CV.to_string(),
        source_name: "jane.txt".to_string(),
        source_path: "cv/jane.txt".to_string(),
        file_type: ".txt".to_string(),
    };
    let chunking = ChunkingConfig {
        chunk_size: 60,
        chunk_overlap: 10,
    };
    let chunks = chunk_document(&document, &chunking);
    assert!(chunks.len() > 2);

    let embedder = CharacterNgramEmbedder::default();
    let index = VectorIndex::build(chunks, vec![document.summary()], &embedder, 2)?;
    let query = embedder.embed_query("Python experience")?;
    let before = index.search(&query, 3)?;

    index.save(&dir.path().join("store"))?;
    let restored = VectorIndex::load(&dir.path().join("store"))?.ok_or("index missing")?;
    let after = restored.search(&query, 3)?;

    assert_eq!(before, after);
    assert_eq!(restored.sources(), index.sources());
    Ok(())
}

#[test]
fn query_before_initialize_is_a_usage_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_cv(dir.path(), "jane.txt", JANE_CV)?;
    let pipeline = RagPipeline::new(
        config(dir.path()),
        CountingConverter::default(),
        CountingEmbedder::default(),
        CitingGenerator,
    )?;

    match pipeline.query("How many years of Python experience does the candidate have?") {
        Err(PipelineError::NotInitialized) => Ok(()),
        other => Err(format!("expected NotInitialized, got {other:?}").into()),
    }
}

#[test]
fn reuse_does_not_touch_loader_or_builder() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_cv(dir.path(), "jane.txt", JANE_CV)?;

    let mut first = RagPipeline::new(
        config(dir.path()),
        CountingConverter::default(),
        CountingEmbedder::default(),
        CitingGenerator,
    )?;
    assert!(matches!(first.initialize(false)?, InitOutcome::Rebuilt { documents: 1, .. }));

    let converter = CountingConverter::default();
    let embedder = CountingEmbedder::default();
    let mut second = RagPipeline::new(
        config(dir.path()),
        converter.clone(),
        embedder.clone(),
        CitingGenerator,
    )?;

    let outcome = second.initialize(false)?;
    assert!(matches!(outcome, InitOutcome::Reused { .. }));
    assert_eq!(second.state(), PipelineState::Ready);
    assert_eq!(converter.calls.get(), 0);
    assert_eq!(embedder.document_batches.get(), 0);

    second.query("Who studied mathematics?")?;
    assert_eq!(embedder.document_batches.get(), 0);
    Ok(())
}

#[test]
fn rebuild_request_ignores_the_persisted_index() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_cv(dir.path(), "jane.txt", JANE_CV)?;

    let converter = CountingConverter::default();
    let mut pipeline = RagPipeline::new(
        config(dir.path()),
        converter.clone(),
        CountingEmbedder::default(),
        CitingGenerator,
    )?;
    pipeline.initialize(false)?;
    pipeline.initialize(true)?;
    assert_eq!(converter.calls.get(), 2);
    Ok(())
}

#[test]
fn python_question_cites_the_matching_cv() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_cv(dir.path(), "jane_doe.txt", JANE_CV)?;
    fs::write(dir.path().join("cv/portrait.jpg"), b"\xff\xd8")?;

    let mut pipeline = RagPipeline::new(
        config(dir.path()),
        LocalConverter::default(),
        CharacterNgramEmbedder::default(),
        CitingGenerator,
    )?;
    pipeline.initialize(false)?;

    let answer =
        pipeline.query("How many years of Python experience does the candidate have?")?;
    assert!(answer
        .cited_chunks
        .iter()
        .any(|chunk| chunk.text.contains("5 years of Python experience")));
    assert!(answer.text.contains("jane_doe.txt"));
    assert_eq!(answer.cited_sources(), vec!["jane_doe.txt"]);
    Ok(())
}

/// Embeds the first batch, then reports an exhausted quota.
#[derive(Default)]
struct QuotaOnSecondBatch {
    batches: Cell<usize>,
    inner: CharacterNgramEmbedder,
}

impl Embedder for QuotaOnSecondBatch {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batches.set(self.batches.get() + 1);
        if self.batches.get() >= 2 {
            return Err(EmbeddingError::QuotaExceeded {
                provider: "gemini".to_string(),
                details: "429 RESOURCE_EXHAUSTED".to_string(),
            });
        }
        self.inner.embed_documents(texts)
    }
}

#[test]
fn quota_during_build_fails_without_persisting() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_cv(dir.path(), "jane.txt", JANE_CV)?;

    let settings = PipelineConfig {
        embed_batch_size: 2,
        ..config(dir.path())
    };
    let chunks = chunk_documents(
        &load_documents(&settings.cv_folder, &LocalConverter::default()).documents,
        &settings.chunking,
    )?;
    assert!(chunks.len() > 2);

    let mut pipeline = RagPipeline::new(
        settings,
        LocalConverter::default(),
        QuotaOnSecondBatch::default(),
        CitingGenerator,
    )?;

    let failure = pipeline
        .initialize(false)
        .err()
        .ok_or("build should hit the quota")?;
    assert!(failure.is_quota_exceeded());
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(pipeline.index().is_none());
    assert!(!dir.path().join("cv_vector_store").join("index.json").exists());
    assert!(matches!(
        pipeline.query("Who knows Python?"),
        Err(PipelineError::Failed(_))
    ));
    Ok(())
}
