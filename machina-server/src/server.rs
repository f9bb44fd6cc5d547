use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use machina_rag::{FieldDescriptor, MachiningAdvisor, SearchResult};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ApiError;

/// Prefix under which every route is mirrored.
pub const API_PREFIX: &str = "/api/llm";

#[derive(Clone)]
pub struct AppState {
    pub advisor: Arc<MachiningAdvisor>,
}

impl AppState {
    pub fn new(advisor: MachiningAdvisor) -> Self {
        Self { advisor: Arc::new(advisor) }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 3000 }
    }
}

/// Body of `/getToolSuggestion` and `/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionRequest {
    pub query: String,
    #[serde(default)]
    pub output: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionResponse {
    pub suggested_tool: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityRequest {
    pub key_terms: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityResponse {
    pub context_pages: Vec<ContextPage>,
}

/// One retrieved chunk as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPage {
    pub page_content: String,
    pub metadata: BTreeMap<String, String>,
    pub score: f32,
}

impl From<SearchResult> for ContextPage {
    fn from(result: SearchResult) -> Self {
        Self {
            page_content: result.chunk.text,
            metadata: result.chunk.metadata,
            score: result.score,
        }
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/getToolSuggestion", post(get_tool_suggestion))
        .route("/getSimilaritySearch", post(get_similarity_search))
        .route("/chat", post(chat))
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .merge(api_routes())
        .nest(API_PREFIX, api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_server(config: ServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for machina server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("machina-server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> impl IntoResponse {
    "Server is running"
}

async fn health() -> impl IntoResponse {
    Json(json!({"status":"ok"}))
}

fn parse_suggestion(
    body: Result<Json<SuggestionRequest>, JsonRejection>,
) -> Result<SuggestionRequest, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("`query` must not be empty".to_string()));
    }
    Ok(request)
}

async fn suggest(state: &AppState, request: SuggestionRequest) -> Result<Value, ApiError> {
    let response = state.advisor.suggest_tool(&request.query, &request.output).await?;
    info!(repairs = response.repair_attempts, "tool suggestion ready");
    Ok(response.into_value())
}

async fn get_tool_suggestion(
    State(state): State<AppState>,
    body: Result<Json<SuggestionRequest>, JsonRejection>,
) -> Result<Json<SuggestionResponse>, ApiError> {
    let request = parse_suggestion(body)?;
    let suggested_tool = suggest(&state, request).await?;
    Ok(Json(SuggestionResponse { suggested_tool }))
}

async fn chat(
    State(state): State<AppState>,
    body: Result<Json<SuggestionRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = parse_suggestion(body)?;
    let message = suggest(&state, request).await?;
    Ok(Json(ChatResponse { message }))
}

async fn get_similarity_search(
    State(state): State<AppState>,
    body: Result<Json<SimilarityRequest>, JsonRejection>,
) -> Result<Json<SimilarityResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if request.key_terms.trim().is_empty() {
        return Err(ApiError::BadRequest("`keyTerms` must not be empty".to_string()));
    }
    let results = state.advisor.similarity_search(&request.key_terms).await?;
    let context_pages = results.into_iter().map(ContextPage::from).collect();
    Ok(Json(SimilarityResponse { context_pages }))
}
