//! Embedding index over chunks, persisted as a single JSON document.
//!
//! The index lives in a directory (`<index_path>/index.json`). Writes go to a
//! temporary file first and are renamed into place, so a crashed save never
//! leaves a half-written index behind.

use crate::embeddings::Embedder;
use crate::error::IndexError;
use crate::models::{Chunk, EmbeddingRecord, ScoredChunk, SourceSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const INDEX_FILE: &str = "index.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorIndex {
    format_version: u32,
    embedding_model: String,
    dimensions: usize,
    built_at: DateTime<Utc>,
    sources: Vec<SourceSummary>,
    records: Vec<EmbeddingRecord>,
}

impl VectorIndex {
    /// Embeds `chunks` in batches of `batch_size`. Any embedding failure aborts
    /// the build; nothing is returned for the chunks already embedded.
    pub fn build<E>(
        chunks: Vec<Chunk>,
        sources: Vec<SourceSummary>,
        embedder: &E,
        batch_size: usize,
    ) -> Result<Self, IndexError>
    where
        E: Embedder + ?Sized,
    {
        info!(chunks = chunks.len(), model = embedder.model_name(), "building vector index");

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<&str> = batch.iter().map(|chunk| chunk.text.as_str()).collect();
            let embedded = embedder.embed_documents(&texts).map_err(|failure| {
                let failure = IndexError::from(failure);
                error!(error = %failure, "embedding batch failed");
                failure
            })?;
            if embedded.len() != batch.len() {
                return Err(IndexError::CountMismatch {
                    chunks: batch.len(),
                    embeddings: embedded.len(),
                });
            }
            vectors.extend(embedded);
        }

        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                found: bad.len(),
            });
        }

        let records = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord { chunk, vector })
            .collect::<Vec<_>>();

        info!(records = records.len(), dimensions, "vector index built");
        Ok(Self {
            format_version: FORMAT_VERSION,
            embedding_model: embedder.model_name().to_string(),
            dimensions,
            built_at: Utc::now(),
            sources,
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn sources(&self) -> &[SourceSummary] {
        &self.sources
    }

    /// The `k` records closest to `query_vector` by cosine similarity, best first.
    /// Equal scores keep insertion order.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if self.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query_vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                found: query_vector.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| (position, cosine_similarity(query_vector, &record.vector)))
            .collect();

        scored.sort_by(|left, right| {
            right
                .1
                .partial_cmp(&left.1)
                .unwrap_or(Ordering::Equal)
                .then(left.0.cmp(&right.0))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, score)| ScoredChunk {
                chunk: self.records[position].chunk.clone(),
                score,
            })
            .collect())
    }

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(path).map_err(|source| IndexError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let target = index_file(path);
        let tmp = target.with_extension("tmp");
        let json = serde_json::to_vec(self)?;

        fs::write(&tmp, json).map_err(|source| IndexError::Io {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &target).map_err(|source| IndexError::Io {
            path: target.display().to_string(),
            source,
        })?;

        info!(path = %target.display(), records = self.records.len(), "vector index saved");
        Ok(())
    }

    /// `Ok(None)` when nothing has been persisted at `path`.
    pub fn load(path: &Path) -> Result<Option<Self>, IndexError> {
        let target = index_file(path);
        if !target.is_file() {
            warn!(path = %path.display(), "vector index not found");
            return Ok(None);
        }

        let bytes = fs::read(&target).map_err(|source| IndexError::Io {
            path: target.display().to_string(),
            source,
        })?;
        let index: VectorIndex =
            serde_json::from_slice(&bytes).map_err(|failure| IndexError::Corrupt {
                path: target.display().to_string(),
                details: failure.to_string(),
            })?;
        index.check(&target)?;

        info!(path = %target.display(), records = index.records.len(), "vector index loaded");
        Ok(Some(index))
    }

    fn check(&self, target: &Path) -> Result<(), IndexError> {
        if self.format_version != FORMAT_VERSION {
            return Err(IndexError::Corrupt {
                path: target.display().to_string(),
                details: format!("unsupported format version {}", self.format_version),
            });
        }
        if let Some(record) = self
            .records
            .iter()
            .find(|record| record.vector.len() != self.dimensions)
        {
            return Err(IndexError::Corrupt {
                path: target.display().to_string(),
                details: format!(
                    "chunk {} has {} dimensions, index declares {}",
                    record.chunk.chunk_id,
                    record.vector.len(),
                    self.dimensions
                ),
            });
        }
        Ok(())
    }
}

fn index_file(path: &Path) -> PathBuf {
    path.join(INDEX_FILE)
}

/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
