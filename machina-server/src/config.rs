//! Command-line and environment configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use machina_rag::ollama::{self, OllamaChatModel, OllamaEmbeddingProvider};
use machina_rag::openai::{self, OpenAIChatModel, OpenAIEmbeddingProvider};
use machina_rag::{EmbeddingProvider, IndexManager, LanguageModel, RagConfig};

use crate::server::ServerConfig;

/// Which backend serves embeddings and completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelProvider {
    Ollama,
    Openai,
}

/// Machining tool-selection server.
#[derive(Parser, Debug, Clone)]
#[command(name = "machina-server", version, about)]
pub struct Cli {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory holding the index snapshot and the `PDFs/` source folder.
    #[arg(long, env = "DOC_STORE", default_value = "./docs")]
    pub doc_store: PathBuf,

    /// Rebuild the index from sources even when a snapshot exists.
    #[arg(long, env = "FORCE_REBUILD")]
    pub force_rebuild: bool,

    /// Source directory to ingest; defaults to `<DOC_STORE>/PDFs`.
    #[arg(long, env = "SOURCE_DIR")]
    pub source_dir: Option<PathBuf>,

    #[arg(long, env = "MODEL_PROVIDER", value_enum, default_value_t = ModelProvider::Ollama)]
    pub provider: ModelProvider,

    #[arg(long, env = "OLLAMA_BASE_URL", default_value = ollama::DEFAULT_BASE_URL)]
    pub ollama_base_url: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = openai::DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Chat model name; defaults depend on the provider.
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Embedding model name; defaults depend on the provider.
    #[arg(long, env = "EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    #[arg(long, env = "TEMPERATURE", default_value_t = ollama::DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    /// Upper bound for each model call, in seconds.
    #[arg(long, env = "MODEL_TIMEOUT_SECS", default_value_t = 120)]
    pub model_timeout_secs: u64,
}

impl Cli {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig { host: self.host.clone(), port: self.port }
    }

    pub fn chat_model(&self) -> &str {
        self.chat_model.as_deref().unwrap_or(match self.provider {
            ModelProvider::Ollama => ollama::DEFAULT_CHAT_MODEL,
            ModelProvider::Openai => openai::DEFAULT_CHAT_MODEL,
        })
    }

    pub fn embedding_model(&self) -> &str {
        self.embedding_model.as_deref().unwrap_or(match self.provider {
            ModelProvider::Ollama => ollama::DEFAULT_EMBEDDING_MODEL,
            ModelProvider::Openai => openai::DEFAULT_EMBEDDING_MODEL,
        })
    }

    /// Index manager over the document store, honouring `--source-dir`.
    pub fn index_manager(
        &self,
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> IndexManager {
        let manager = IndexManager::new(&self.doc_store, config, embedder);
        match &self.source_dir {
            Some(dir) => manager.with_source_dir(dir),
            None => manager,
        }
    }

    pub fn rag_config(&self) -> anyhow::Result<RagConfig> {
        RagConfig::builder()
            .model_timeout(Duration::from_secs(self.model_timeout_secs))
            .build()
            .context("invalid pipeline configuration")
    }

    /// Build the embedding and chat backends for the selected provider.
    pub fn backends(&self) -> anyhow::Result<(Arc<dyn EmbeddingProvider>, Arc<dyn LanguageModel>)> {
        match self.provider {
            ModelProvider::Ollama => {
                let embedder = OllamaEmbeddingProvider::new(&self.ollama_base_url)?
                    .with_model(self.embedding_model());
                let model = OllamaChatModel::new(&self.ollama_base_url)?
                    .with_model(self.chat_model())
                    .with_temperature(self.temperature);
                Ok((Arc::new(embedder), Arc::new(model)))
            }
            ModelProvider::Openai => {
                let key = self
                    .openai_api_key
                    .clone()
                    .context("OPENAI_API_KEY is required when MODEL_PROVIDER=openai")?;
                let embedder = OpenAIEmbeddingProvider::new(key.clone())?
                    .with_base_url(&self.openai_base_url)
                    .with_model(self.embedding_model());
                let model = OpenAIChatModel::new(key)?
                    .with_base_url(&self.openai_base_url)
                    .with_model(self.chat_model())
                    .with_temperature(self.temperature);
                Ok((Arc::new(embedder), Arc::new(model)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_ollama_setup() {
        let cli = Cli::try_parse_from(["machina-server"]).unwrap();
        assert_eq!(cli.port, 3000);
        assert_eq!(cli.doc_store, PathBuf::from("./docs"));
        assert_eq!(cli.provider, ModelProvider::Ollama);
        assert!(!cli.force_rebuild);
        assert_eq!(cli.rag_config().unwrap().model_timeout, Duration::from_secs(120));
    }

    #[test]
    fn model_defaults_follow_provider() {
        let local = Cli::try_parse_from(["machina-server", "--provider", "ollama"]).unwrap();
        let hosted = Cli::try_parse_from(["machina-server", "--provider", "openai"]).unwrap();
        if local.chat_model.is_none() && local.embedding_model.is_none() {
            assert_eq!(local.chat_model(), "llama3.2:latest");
            assert_eq!(local.embedding_model(), "nomic-embed-text");
            assert_eq!(hosted.chat_model(), "gpt-4o-mini");
            assert_eq!(hosted.embedding_model(), "text-embedding-3-small");
        }

        let pinned = Cli::try_parse_from([
            "machina-server",
            "--provider",
            "openai",
            "--chat-model",
            "gpt-4o",
            "--embedding-model",
            "text-embedding-3-large",
        ])
        .unwrap();
        assert_eq!(pinned.chat_model(), "gpt-4o");
        assert_eq!(pinned.embedding_model(), "text-embedding-3-large");
    }

    #[test]
    fn openai_rejects_empty_api_key() {
        let cli =
            Cli::try_parse_from(["machina-server", "--provider", "openai", "--openai-api-key", ""])
                .unwrap();
        assert!(cli.backends().is_err());
    }

    #[test]
    fn openai_backends_build_with_key() {
        let cli = Cli::try_parse_from([
            "machina-server",
            "--provider",
            "openai",
            "--openai-api-key",
            "sk-test",
        ])
        .unwrap();
        let (embedder, _) = cli.backends().unwrap();
        assert_eq!(embedder.name(), "OpenAI");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cli = Cli::try_parse_from(["machina-server", "--model-timeout-secs", "0"]).unwrap();
        assert!(cli.rag_config().is_err());
    }
}
