//! HTTP surface: aggregated and streaming invocation endpoints.

mod error;
mod routes;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use promptrelay_core::Config;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::subprocess::SpawnConfig;

pub use error::ApiError;

/// Records buffered between a stream relay and its HTTP body.
const RELAY_BUFFER: usize = 64;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub spawn: Arc<SpawnConfig>,
    pub max_body_bytes: usize,
    pub relay_buffer: usize,
}

impl AppState {
    pub fn new(spawn: SpawnConfig, max_body_bytes: usize) -> Self {
        Self {
            spawn: Arc::new(spawn),
            max_body_bytes,
            relay_buffer: RELAY_BUFFER,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(SpawnConfig::from_config(config), config.daemon.max_body_bytes)
    }
}

/// Build the router with every route and middleware layer.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/claude", get(routes::docs).post(routes::invoke))
        .route("/api/claude/stream", post(routes::stream))
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
