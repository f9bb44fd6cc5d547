//! Configuration for the retrieval and generation pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// How source documents are split into chunks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Fixed character windows with exact overlap.
    #[default]
    Fixed,
    /// Paragraph, sentence, then word boundaries. Overlap is at most
    /// `chunk_overlap` and chunk counts are not monotone in `chunk_size`.
    Recursive,
}

/// Configuration parameters for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Splitting strategy used during ingestion.
    pub chunking: ChunkingStrategy,
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Number of search results concatenated into the prompt context.
    pub context_chunks: usize,
    /// Minimum similarity score for results (results below this are filtered out).
    pub similarity_threshold: f32,
    /// Number of chunks sent to the embedder per call.
    pub embed_batch_size: usize,
    /// Number of embedding batches allowed in flight at once.
    pub embed_concurrency: usize,
    /// Number of repair calls made after the first unparseable answer.
    pub max_repairs: usize,
    /// Upper bound for each individual model call.
    #[serde(with = "duration_secs")]
    pub model_timeout: Duration,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            chunking: ChunkingStrategy::default(),
            top_k: 10,
            context_chunks: 3,
            similarity_threshold: 0.0,
            embed_batch_size: 25,
            embed_concurrency: 1,
            max_repairs: 2,
            model_timeout: Duration::from_secs(120),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the chunking strategy.
    pub fn chunking(mut self, strategy: ChunkingStrategy) -> Self {
        self.config.chunking = strategy;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set how many results are joined into the prompt context.
    pub fn context_chunks(mut self, n: usize) -> Self {
        self.config.context_chunks = n;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the embedding batch size.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set how many embedding batches may run concurrently.
    pub fn embed_concurrency(mut self, n: usize) -> Self {
        self.config.embed_concurrency = n;
        self
    }

    /// Set the repair budget for malformed model output.
    pub fn max_repairs(mut self, n: usize) -> Self {
        self.config.max_repairs = n;
        self
    }

    /// Set the per-call model timeout.
    pub fn model_timeout(mut self, timeout: Duration) -> Self {
        self.config.model_timeout = timeout;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `embed_batch_size == 0` or `embed_concurrency == 0`
    /// - `max_repairs == 0`
    /// - `model_timeout` is zero
    pub fn build(self) -> Result<RagConfig> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        if c.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if c.embed_batch_size == 0 || c.embed_concurrency == 0 {
            return Err(RagError::ConfigError(
                "embed_batch_size and embed_concurrency must be greater than zero".to_string(),
            ));
        }
        if c.max_repairs == 0 {
            return Err(RagError::ConfigError("max_repairs must be at least 1".to_string()));
        }
        if c.model_timeout.is_zero() {
            return Err(RagError::ConfigError("model_timeout must be non-zero".to_string()));
        }
        Ok(self.config)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
