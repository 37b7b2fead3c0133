//! Router assembly.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers;
use super::middleware::{count_requests, require_api_key};

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/webhook", post(handlers::webhook))
        .route("/api/announce", post(handlers::announce))
        .route("/api/status", get(handlers::status))
        .route("/api/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_api_key,
        ))
        .layer(middleware::from_fn(count_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
