//! Error types for the `machina-rag` crate.

use thiserror::Error;

/// Errors that can occur in retrieval and generation.
#[derive(Debug, Error)]
pub enum RagError {
    /// Source documents could not be read.
    #[error("Ingestion error ({path}): {message}")]
    IngestionError {
        /// The file or directory that failed.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector index snapshot could not be written, read or validated.
    #[error("Snapshot error ({path}): {message}")]
    SnapshotError {
        /// The snapshot path involved.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// Two indexes with different embedding dimensions were combined.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension already held by the index.
        expected: usize,
        /// The offending dimension.
        actual: usize,
    },

    /// The language model call failed.
    #[error("Model error ({provider}): {message}")]
    ModelError {
        /// The model backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model did not answer within the configured bound.
    #[error("Model call timed out after {seconds}s")]
    ModelTimeout {
        /// The timeout that elapsed, in seconds.
        seconds: u64,
    },

    /// Model output does not match the requested output schema.
    #[error("Output does not match schema: {}", .0.join("; "))]
    SchemaMismatch(Vec<String>),

    /// Model output could not be parsed even after repair attempts.
    #[error("Output parsing failed after {attempts} attempt(s): {message}")]
    OutputParse {
        /// Total number of model calls made for the request.
        attempts: usize,
        /// The last parse error.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
