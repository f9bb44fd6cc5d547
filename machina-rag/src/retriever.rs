//! Text-to-chunk similarity search over a loaded [`VectorIndex`].

use std::sync::Arc;

use tracing::{debug, error};

use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::{self, VectorIndex};

/// Pairs a read-only index with the embedder that produced it.
///
/// Cloning is cheap; clones share the same index.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    similarity_threshold: f32,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { index, embedder, similarity_threshold: f32::MIN }
    }

    /// Drop results scoring below `threshold`.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Embed `query` and return up to `top_k` nearest chunks, best first.
    ///
    /// An empty index returns an empty list without calling the embedder.
    ///
    /// # Errors
    ///
    /// Returns the embedder's error if the query cannot be embedded,
    /// [`RagError::EmbeddingError`] if the query vector holds NaN or infinity,
    /// or [`RagError::PipelineError`] if its dimension differs from the index.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if self.index.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .inspect_err(|e| error!(error = %e, "embedding failed during query"))?;

        if !index::is_finite(&query_embedding) {
            return Err(RagError::EmbeddingError {
                provider: self.embedder.name().to_string(),
                message: "query embedding has non-finite components".to_string(),
            });
        }

        if let Some(expected) = self.index.dimensions() {
            if expected != query_embedding.len() {
                return Err(RagError::PipelineError(format!(
                    "query embedding has {} dimensions, index has {expected}",
                    query_embedding.len()
                )));
            }
        }

        let threshold = self.similarity_threshold;
        let results: Vec<SearchResult> = self
            .index
            .search(&query_embedding, top_k)
            .into_iter()
            .filter(|r| r.score >= threshold)
            .collect();

        debug!(result_count = results.len(), top_k, "similarity search completed");
        Ok(results)
    }
}
