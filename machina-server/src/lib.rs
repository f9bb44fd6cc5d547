//! `machina-server` exposes the machining tool advisor over HTTP.
//! Routes are served at the root and mirrored under `/api/llm`.

pub mod config;
pub mod error;
pub mod server;

pub use config::{Cli, ModelProvider};
pub use error::ApiError;
pub use server::{AppState, ServerConfig, app_router, run_server};
