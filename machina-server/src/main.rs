use anyhow::Context;
use clap::Parser;
use machina_rag::MachiningAdvisor;
use machina_server::{AppState, Cli, run_server};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.rag_config()?;
    let (embedder, model) = cli.backends()?;
    info!(
        provider = ?cli.provider,
        chat_model = cli.chat_model(),
        embedding_model = cli.embedding_model(),
        doc_store = %cli.doc_store.display(),
        "starting machina-server"
    );

    let prepared = cli
        .index_manager(config.clone(), embedder.clone())
        .prepare(cli.force_rebuild)
        .await
        .context("failed to prepare the vector index")?;
    info!(origin = ?prepared.origin, entry_count = prepared.index.len(), "vector index ready");

    let advisor = MachiningAdvisor::builder()
        .config(config)
        .embedding_provider(embedder)
        .language_model(model)
        .index(prepared.index)
        .build()?;

    run_server(cli.server_config(), AppState::new(advisor)).await
}
