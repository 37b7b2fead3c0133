//! Request middleware: API-key auth and request counting.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::metrics::HTTP_REQUESTS_TOTAL;
use crate::state::AppState;

/// Paths reachable without a key: liveness probes and metric scrapers.
const OPEN_PATHS: &[&str] = &["/api/healthz", "/metrics"];

pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.config.daemon.api_key {
        let path = request.uri().path();
        if !OPEN_PATHS.contains(&path) {
            let provided = request
                .headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok());
            if provided != Some(expected.as_str()) {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "missing or invalid api key"})),
                )
                    .into_response();
            }
        }
    }
    next.run(request).await
}

pub async fn count_requests(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&path, response.status().as_str()])
        .inc();
    response
}
