//! Tool-suggestion pipeline orchestrator.
//!
//! The [`MachiningAdvisor`] coordinates the query workflow by composing a
//! [`Retriever`] over a prepared [`VectorIndex`] with an [`ExpertChain`].
//! All collaborators are injected through [`MachiningAdvisor::builder()`].
//!
//! # Example
//!
//! ```rust,ignore
//! use machina_rag::{MachiningAdvisor, RagConfig, FieldDescriptor};
//!
//! let advisor = MachiningAdvisor::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(embedder))
//!     .language_model(Arc::new(model))
//!     .index(prepared.index)
//!     .build()?;
//!
//! let fields = [FieldDescriptor::new("toolType", "string", "tool type")];
//! let answer = advisor.suggest_tool("What endmill fits a 10 in² pocket?", &fields).await?;
//! ```

use std::sync::Arc;

use tracing::{info, instrument};

use crate::chain::{ExpertChain, ModelResponse};
use crate::config::RagConfig;
use crate::context::assemble_context;
use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::model::LanguageModel;
use crate::retriever::Retriever;
use crate::schema::{FieldDescriptor, OutputSchema};

/// Answers tool-selection questions from retrieved context.
///
/// Read-only after construction; share it behind an `Arc` across requests.
pub struct MachiningAdvisor {
    config: RagConfig,
    retriever: Retriever,
    chain: ExpertChain,
}

impl MachiningAdvisor {
    /// Create a new [`MachiningAdvisorBuilder`].
    pub fn builder() -> MachiningAdvisorBuilder {
        MachiningAdvisorBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return the retriever backing similarity search.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Return the `top_k` chunks most similar to `key_terms`.
    pub async fn similarity_search(&self, key_terms: &str) -> Result<Vec<SearchResult>> {
        self.retriever.search(key_terms, self.config.top_k).await
    }

    /// Retrieve context for `query` and ask the model for an answer shaped by `descriptors`.
    ///
    /// Retrieval finishes before the model is called. An empty index still
    /// produces a model call with empty context.
    #[instrument(skip(self, descriptors), fields(field_count = descriptors.len()))]
    pub async fn suggest_tool(
        &self,
        query: &str,
        descriptors: &[FieldDescriptor],
    ) -> Result<ModelResponse> {
        let schema = OutputSchema::build(descriptors);
        let results = self.similarity_search(query).await?;
        let context = assemble_context(&results, self.config.context_chunks);
        info!(
            retrieved = results.len(),
            context_len = context.len(),
            "assembled context for tool suggestion"
        );
        self.chain.get_response(&context, query, &schema).await
    }
}

/// Builder for constructing a [`MachiningAdvisor`].
///
/// `config` defaults to [`RagConfig::default()`]; `index` defaults to an
/// empty index. The embedding provider and language model are required.
#[derive(Default)]
pub struct MachiningAdvisorBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    language_model: Option<Arc<dyn LanguageModel>>,
    index: Option<Arc<VectorIndex>>,
}

impl MachiningAdvisorBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for queries.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the language model.
    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    /// Set the prepared vector index.
    pub fn index(mut self, index: VectorIndex) -> Self {
        self.index = Some(Arc::new(index));
        self
    }

    /// Set a shared vector index.
    pub fn shared_index(mut self, index: Arc<VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Build the [`MachiningAdvisor`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing.
    pub fn build(self) -> Result<MachiningAdvisor> {
        let config = self.config.unwrap_or_default();
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let language_model = self
            .language_model
            .ok_or_else(|| RagError::ConfigError("language_model is required".to_string()))?;
        let index = self.index.unwrap_or_default();

        let retriever = Retriever::new(index, embedding_provider)
            .with_similarity_threshold(config.similarity_threshold);
        let chain = ExpertChain::from_config(language_model, &config);

        Ok(MachiningAdvisor { config, retriever, chain })
    }
}
