//! The machining expert chain: prompt, generate, parse, repair.
//!
//! A request moves through a small state machine:
//!
//! ```text
//! Pending -> ModelCalled -> Parsed
//!                        \-> ParseFailed -> RepairAttempted -> Parsed
//!                                        |                  \-> ParseFailed ...
//!                                        \-> TerminalFailure (repair budget spent)
//! ```
//!
//! `Parsed` and `TerminalFailure` are terminal. Model failures and timeouts
//! are not repaired; they end the request immediately.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::model::{LanguageModel, ModelRequest};
use crate::output::extract_json;
use crate::prompt::{expert_prompt, format_instructions, repair_prompt};
use crate::schema::OutputSchema;

/// Stage labels recorded while a request runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChainStage {
    Pending,
    ModelCalled,
    Parsed,
    ParseFailed,
    RepairAttempted,
    TerminalFailure,
}

enum ChainState {
    Pending,
    ModelCalled { raw: String },
    Parsed { raw: String, value: Map<String, Value> },
    ParseFailed { raw: String, error: String },
    RepairAttempted { raw: String },
    TerminalFailure { error: String },
}

impl ChainState {
    fn stage(&self) -> ChainStage {
        match self {
            Self::Pending => ChainStage::Pending,
            Self::ModelCalled { .. } => ChainStage::ModelCalled,
            Self::Parsed { .. } => ChainStage::Parsed,
            Self::ParseFailed { .. } => ChainStage::ParseFailed,
            Self::RepairAttempted { .. } => ChainStage::RepairAttempted,
            Self::TerminalFailure { .. } => ChainStage::TerminalFailure,
        }
    }
}

/// A successfully parsed model answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelResponse {
    /// The raw text of the completion that parsed.
    pub raw: String,
    /// The structured value; its keys are exactly the schema's keys.
    pub value: Map<String, Value>,
    /// How many repair calls were needed.
    pub repair_attempts: usize,
    /// Stages the request passed through, in order.
    pub trace: Vec<ChainStage>,
}

impl ModelResponse {
    /// The structured value as a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.value)
    }
}

/// Prompts a [`LanguageModel`] for a structured answer and repairs malformed output.
///
/// # Example
///
/// ```rust,ignore
/// let chain = ExpertChain::new(model).max_repairs(2);
/// let response = chain.get_response(&context, "Which end mill?", &schema).await?;
/// ```
pub struct ExpertChain {
    model: Arc<dyn LanguageModel>,
    max_repairs: usize,
    timeout: Duration,
}

impl ExpertChain {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        let defaults = RagConfig::default();
        Self { model, max_repairs: defaults.max_repairs, timeout: defaults.model_timeout }
    }

    /// Create a chain using the repair budget and timeout from `config`.
    pub fn from_config(model: Arc<dyn LanguageModel>, config: &RagConfig) -> Self {
        Self::new(model).max_repairs(config.max_repairs).timeout(config.model_timeout)
    }

    /// Number of repair calls allowed after the first answer. At least one.
    pub fn max_repairs(mut self, n: usize) -> Self {
        self.max_repairs = n.max(1);
        self
    }

    /// Upper bound for each model call, including repairs.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the model for an answer to `query` that conforms to `schema`.
    ///
    /// # Errors
    ///
    /// - [`RagError::ModelError`] or [`RagError::ModelTimeout`] if any model call fails.
    /// - [`RagError::OutputParse`] if no conforming answer was produced within the repair budget.
    pub async fn get_response(
        &self,
        context: &str,
        query: &str,
        schema: &OutputSchema,
    ) -> Result<ModelResponse> {
        let instructions = format_instructions(schema);
        let json_schema = schema.to_json_schema();
        let mut repairs = 0;
        let mut state = ChainState::Pending;
        let mut trace = vec![state.stage()];

        loop {
            state = match state {
                ChainState::Pending => {
                    let prompt = expert_prompt(context, query, &instructions);
                    let raw = self.call(prompt, &json_schema).await?;
                    ChainState::ModelCalled { raw }
                }
                ChainState::ModelCalled { raw } | ChainState::RepairAttempted { raw } => {
                    match extract_json(&raw).and_then(|v| schema.validate(&v)) {
                        Ok(value) => ChainState::Parsed { raw, value },
                        Err(e) => ChainState::ParseFailed { raw, error: e.to_string() },
                    }
                }
                ChainState::ParseFailed { raw, error } => {
                    if repairs >= self.max_repairs {
                        ChainState::TerminalFailure { error }
                    } else {
                        repairs += 1;
                        warn!(
                            attempt = repairs,
                            error = %error,
                            "model output did not parse, repairing"
                        );
                        let prompt = repair_prompt(&instructions, &raw, &error);
                        let raw = self.call(prompt, &json_schema).await?;
                        ChainState::RepairAttempted { raw }
                    }
                }
                ChainState::Parsed { raw, value } => {
                    info!(model = self.model.name(), repairs, "structured answer parsed");
                    return Ok(ModelResponse { raw, value, repair_attempts: repairs, trace });
                }
                ChainState::TerminalFailure { error } => {
                    warn!(
                        model = self.model.name(),
                        repairs,
                        error = %error,
                        "giving up on model output"
                    );
                    return Err(RagError::OutputParse { attempts: repairs + 1, message: error });
                }
            };
            trace.push(state.stage());
        }
    }

    async fn call(&self, prompt: String, schema: &Value) -> Result<String> {
        debug!(model = self.model.name(), prompt_len = prompt.len(), "calling model");
        let request = ModelRequest::new(prompt).with_schema(schema.clone());
        match tokio::time::timeout(self.timeout, self.model.generate(&request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    model = self.model.name(),
                    timeout_secs = self.timeout.as_secs(),
                    "model call timed out"
                );
                Err(RagError::ModelTimeout { seconds: self.timeout.as_secs() })
            }
        }
    }
}
