//! Append-only vector index with cosine-similarity search.
//!
//! A [`VectorIndex`] is an ordered list of (chunk, embedding) entries. Indexes
//! are combined with [`VectorIndex::merge`], which concatenates entries; the
//! empty index is its identity, so building an index batch-by-batch and
//! merging the partial results gives the same search space as embedding
//! everything at once.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::{Chunk, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// A chunk together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// An in-memory, append-only index over chunk embeddings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VectorIndex {
    dimensions: Option<usize>,
    entries: Vec<IndexEntry>,
}

/// True when every component is a finite number.
pub fn is_finite(embedding: &[f32]) -> bool {
    embedding.iter().all(|x| x.is_finite())
}

/// Compute cosine similarity between two vectors.
///
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

impl VectorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index from entries, checking that all embeddings share one dimension.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] on inconsistent embeddings, or
    /// [`RagError::EmbeddingError`] if any component is NaN or infinite.
    pub fn from_entries(entries: Vec<IndexEntry>) -> Result<Self> {
        let dimensions = entries.first().map(|e| e.embedding.len());
        if let Some(expected) = dimensions {
            if let Some(bad) = entries.iter().find(|e| e.embedding.len() != expected) {
                return Err(RagError::DimensionMismatch { expected, actual: bad.embedding.len() });
            }
        }
        if let Some(bad) = entries.iter().find(|e| !is_finite(&e.embedding)) {
            return Err(RagError::EmbeddingError {
                provider: "vector-index".to_string(),
                message: format!("embedding for chunk {} has non-finite components", bad.chunk.id),
            });
        }
        Ok(Self { dimensions, entries })
    }

    /// Pair chunks with their embeddings, in order.
    pub fn from_embeddings(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::PipelineError(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect();
        Self::from_entries(entries)
    }

    /// Embedding dimension, or `None` while the index is empty.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Append `other`'s entries after this index's entries.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if both indexes are non-empty
    /// and their dimensions differ.
    pub fn merge(mut self, other: VectorIndex) -> Result<Self> {
        match (self.dimensions, other.dimensions) {
            (Some(expected), Some(actual)) if expected != actual => {
                return Err(RagError::DimensionMismatch { expected, actual });
            }
            (None, dims) => self.dimensions = dims,
            _ => {}
        }
        self.entries.extend(other.entries);
        Ok(self)
    }

    /// Return up to `top_k` entries most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order. Entries scoring NaN are skipped.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<SearchResult> {
        if top_k == 0 || self.entries.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<SearchResult> = self
            .entries
            .iter()
            .map(|entry| SearchResult {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(&entry.embedding, query),
            })
            .filter(|result| !result.score.is_nan())
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        scored
    }
}

/// Embeds chunks in fixed-size batches and reduces the partial indexes with
/// [`VectorIndex::merge`].
///
/// # Example
///
/// ```rust,ignore
/// let index = IndexBuilder::new(embedder).batch_size(25).build(chunks).await?;
/// ```
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    concurrency: usize,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder, batch_size: 25, concurrency: 1 }
    }

    /// Number of chunks per embedding call. Zero is treated as one.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Number of embedding calls allowed in flight. Results are still merged in batch order.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Embed every chunk exactly once and return the merged index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if any batch fails or the provider
    /// returns the wrong number of vectors.
    pub async fn build(&self, chunks: Vec<Chunk>) -> Result<VectorIndex> {
        let total = chunks.len();
        let batches: Vec<Vec<Chunk>> =
            chunks.chunks(self.batch_size).map(<[Chunk]>::to_vec).collect();
        let batch_count = batches.len();

        let index = stream::iter(batches.into_iter().enumerate())
            .map(|(i, batch)| self.embed_batch(i, batch))
            .buffered(self.concurrency)
            .try_fold(VectorIndex::new(), |acc, partial| async move { acc.merge(partial) })
            .await?;

        info!(
            provider = self.embedder.name(),
            chunk_count = total,
            batch_count,
            vector_count = index.len(),
            "built vector index"
        );
        Ok(index)
    }

    async fn embed_batch(&self, batch_no: usize, batch: Vec<Chunk>) -> Result<VectorIndex> {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != batch.len() {
            return Err(RagError::EmbeddingError {
                provider: self.embedder.name().to_string(),
                message: format!(
                    "batch {batch_no}: expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                ),
            });
        }
        if let Some(pos) = embeddings.iter().position(|e| !is_finite(e)) {
            return Err(RagError::EmbeddingError {
                provider: self.embedder.name().to_string(),
                message: format!("batch {batch_no}: embedding {pos} has non-finite components"),
            });
        }
        debug!(batch = batch_no, size = batch.len(), "embedded batch");
        VectorIndex::from_embeddings(batch, embeddings)
    }
}
