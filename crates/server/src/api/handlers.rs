//! Request handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use reseeder_core::announce::AnnounceEvent;
use reseeder_core::pipeline::PipelineError;

use crate::metrics::{self, ANNOUNCES_TOTAL, INFLIGHT_DECISIONS, SEARCHEES, WEBHOOK_DECISIONS_TOTAL};
use crate::state::AppState;

/// Handler-level error with an HTTP status.
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({"error": self.1}))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let status = match &e {
            PipelineError::UnknownSearchee(_) => StatusCode::NOT_FOUND,
            PipelineError::CycleTimeout => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

/// On-demand search request.
#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    /// Searchee name to search for.
    pub name: String,
}

/// `POST /api/webhook` — run a search cycle for one searchee now.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WebhookRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    info!(searchee = %request.name, "Webhook search requested");
    let summary = state.pipeline.search_by_name(&request.name).await?;
    for (decision, count) in &summary.decisions {
        WEBHOOK_DECISIONS_TOTAL
            .with_label_values(&[*decision])
            .inc_by(*count as u64);
    }
    Ok(Json(json!({ "summary": summary })))
}

/// `POST /api/announce` — enqueue a real-time announce event.
pub async fn announce(
    State(state): State<Arc<AppState>>,
    Json(event): Json<AnnounceEvent>,
) -> Response {
    match state.announce_tx.try_send(event) {
        Ok(()) => {
            ANNOUNCES_TOTAL.with_label_values(&["queued"]).inc();
            (StatusCode::ACCEPTED, Json(json!({"status": "queued"}))).into_response()
        }
        Err(_) => {
            // Queue full or listener gone; the producer should retry later.
            ANNOUNCES_TOTAL.with_label_values(&["rejected"]).inc();
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "announce queue full"})),
            )
                .into_response()
        }
    }
}

/// `GET /api/status` — pipeline, indexer, and job state.
pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let pipeline = state.pipeline.status().await;
    let indexers = state.gateway.snapshots().await;
    let jobs = state
        .store
        .list_job_status()
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let config = reseeder_core::SanitizedConfig::from(&state.config);

    Ok(Json(json!({
        "started_at": state.started_at,
        "pipeline": pipeline,
        "indexers": indexers,
        "jobs": jobs,
        "config": config,
    })))
}

/// `GET /api/healthz`.
pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// `GET /metrics` — Prometheus text format; gauges refresh at scrape time.
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    let status = state.pipeline.status().await;
    SEARCHEES.set(status.searchees as i64);
    INFLIGHT_DECISIONS.set(status.inflight_decisions as i64);
    metrics::render()
}
