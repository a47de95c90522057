//! HTTP API gateway for Deckhand.
//!
//! Exposes a health check and the v1 API: buffered chat, SSE chat
//! streaming, and the tool catalogue. Every chat request is one
//! orchestration call over the conversation the client sends; the gateway
//! keeps no chat history of its own.
//!
//! Built on Axum for high performance async HTTP.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use deckhand_agent::Orchestrator;
use deckhand_config::AppConfig;
use deckhand_core::provider::LlmConfig;
use deckhand_tools::todo::TodoStore;

/// Request bodies carry whole conversations, including image parts.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared application state for the gateway.
pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Model settings used when a request does not override them
    pub defaults: LlmConfig,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(orchestrator: Orchestrator, defaults: LlmConfig) -> SharedState {
        Arc::new(Self {
            orchestrator,
            defaults,
        })
    }

    /// Build the provider, tool families, and orchestrator from config.
    pub fn from_config(config: &AppConfig) -> SharedState {
        let provider = deckhand_providers::build_from_config(config);
        let todo_store = TodoStore::new(config.tools.todo.max_sessions);
        let dispatcher = Arc::new(deckhand_tools::default_dispatcher(config, todo_store));
        let orchestrator = Orchestrator::from_config(provider, dispatcher, &config.orchestration);
        Self::new(orchestrator, config.llm_config())
    }
}

/// Build the full router: health plus the v1 API nested under `/v1`.
///
/// Layers applied:
/// - Permissive CORS (the gateway sits behind the web client's origin)
/// - Request body size limit (16 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let state = AppState::from_config(&config);
    info!(
        provider = %state.orchestrator.provider().name(),
        model = %state.defaults.model,
        tools = state.orchestrator.dispatcher().definitions().len(),
        "Gateway state ready"
    );

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
