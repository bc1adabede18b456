// src/api/mod.rs — Lightweight HTTP API server for external surfaces

pub mod auth;
pub mod handlers;
pub mod types;

use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::engine::Engine;
use crate::infra::config::ApiConfig;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
    pub token: Option<String>,
}

/// Build the axum router with all API routes.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/api/v1/chat", post(handlers::chat))
        .route("/api/v1/chat/stream", post(handlers::chat_stream))
        .route("/api/v1/memories", post(handlers::add_memories))
        .route("/api/v1/memories", get(handlers::list_memories))
        .route("/api/v1/memories/search", get(handlers::search_memories))
        .route("/api/v1/memories/stats", get(handlers::memory_stats))
        .route("/api/v1/memories/{id}", delete(handlers::delete_memory))
        .route("/api/v1/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the configured port (blocking).
pub async fn start_server(config: &ApiConfig, state: ApiState) -> anyhow::Result<()> {
    let port = config.port;
    let addr = format!("127.0.0.1:{port}");

    let router = build_router(state);

    tracing::info!("API server listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
