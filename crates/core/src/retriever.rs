use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::index::VectorIndex;
use crate::models::ScoredChunk;
use tracing::info;

pub struct Retriever<'a, E: ?Sized> {
    embedder: &'a E,
}

impl<'a, E> Retriever<'a, E>
where
    E: Embedder + ?Sized,
{
    pub fn new(embedder: &'a E) -> Self {
        Self { embedder }
    }

    /// Top-`k` chunks for `query`, most similar first.
    ///
    /// A missing index is a usage error ([`SearchError::NotReady`]); an index
    /// without records simply yields no hits.
    pub fn search(
        &self,
        index: Option<&VectorIndex>,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        let index = index.ok_or_else(|| {
            SearchError::NotReady("vector index not initialized; create or load it first".to_string())
        })?;
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_query(query)?;
        let hits = index.search(&query_vector, k)?;

        info!(query_chars = query.len(), hits = hits.len(), k, "retrieved context");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::IndexError;
    use crate::models::Chunk;

    fn chunk(index: u64, text: &str) -> Chunk {
        Chunk {
            chunk_id: format!("c{index}"),
            chunk_index: index,
            text: text.to_string(),
            source_name: "cv.txt".to_string(),
            start_offset: None,
        }
    }

    #[test]
    fn absent_index_is_a_usage_error() {
        let embedder = CharacterNgramEmbedder::default();
        let result = Retriever::new(&embedder).search(None, "python", 4);
        assert!(matches!(result, Err(SearchError::NotReady(_))));
    }

    #[test]
    fn empty_index_is_not_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = CharacterNgramEmbedder::default();
        let index = VectorIndex::build(Vec::new(), Vec::new(), &embedder, 8)?;
        let hits = Retriever::new(&embedder).search(Some(&index), "python", 4)?;
        assert!(hits.is_empty());
        Ok(())
    }

    #[test]
    fn nearest_chunk_comes_first() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = CharacterNgramEmbedder::default();
        let index: Result<VectorIndex, IndexError> = VectorIndex::build(
            vec![
                chunk(0, "Fluent in Spanish and French"),
                chunk(1, "5 years of Python experience building APIs"),
                chunk(2, "Bachelor of Arts in History"),
            ],
            Vec::new(),
            &embedder,
            8,
        );
        let index = index?;
        let hits = Retriever::new(&embedder).search(Some(&index), "years of Python experience", 2)?;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.chunk_id, "c1");
        Ok(())
    }

    #[test]
    fn blank_query_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = CharacterNgramEmbedder::default();
        let index = VectorIndex::build(vec![chunk(0, "text")], Vec::new(), &embedder, 8)?;
        let result = Retriever::new(&embedder).search(Some(&index), "   ", 2);
        assert!(matches!(result, Err(SearchError::EmptyQuery)));
        Ok(())
    }
}
