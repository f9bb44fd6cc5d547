//! Retrieval-augmented machining tool selection.
//!
//! This crate provides:
//! - Directory ingestion of PDF and text sources into page documents
//! - Fixed-size and recursive chunking
//! - A cosine-similarity vector index with an atomic, checksummed snapshot
//! - Per-request output schemas built from field descriptors
//! - An expert chain that prompts a language model and repairs malformed answers
//! - [`MachiningAdvisor`], which ties retrieval and generation together
//!
//! Embedding and generation backends are traits. Ollama (`ollama` feature)
//! and OpenAI-compatible (`openai` feature) implementations ship here, and
//! [`mock`] has deterministic doubles for tests.

pub mod chain;
pub mod chunking;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod loader;
pub mod manager;
pub mod mock;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod schema;
pub mod snapshot;

#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

pub use chain::{ChainStage, ExpertChain, ModelResponse};
pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker, chunker_for, split_documents};
pub use config::{ChunkingStrategy, RagConfig, RagConfigBuilder};
pub use context::{DEFAULT_CONTEXT_CHUNKS, assemble_context};
pub use document::{Chunk, Document, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use index::{IndexBuilder, IndexEntry, VectorIndex};
pub use loader::DirectoryLoader;
pub use manager::{IndexManager, IndexOrigin, PreparedIndex};
pub use model::{LanguageModel, ModelRequest};
pub use output::extract_json;
pub use pipeline::{MachiningAdvisor, MachiningAdvisorBuilder};
pub use retriever::Retriever;
pub use schema::{FieldDescriptor, FieldType, OutputSchema, SchemaField};
pub use snapshot::SnapshotInfo;
