//! Language model trait used by the expert chain.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A single text-generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// The fully formatted prompt.
    pub prompt: String,
    /// JSON Schema the answer should follow. Backends that support
    /// constrained or JSON-mode output may pass it through; others ignore it.
    pub schema: Option<Value>,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), schema: None }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// A text-generation backend.
///
/// Given a formatted prompt and a target output schema, returns the model's
/// raw text or an error. Parsing and repair happen in
/// [`ExpertChain`](crate::ExpertChain), not here.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for `request`.
    async fn generate(&self, request: &ModelRequest) -> Result<String>;

    /// A short name used in logs and errors.
    fn name(&self) -> &str;
}
