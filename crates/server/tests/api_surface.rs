//! API surface tests with an in-process router and mock-free minimal state.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use reseeder_core::config::{load_config_from_str, Config};
use reseeder_server::api::create_router;
use reseeder_server::state::AppState;

struct Fixture {
    router: Router,
    _tmp: TempDir,
}

async fn fixture(api_key: Option<&str>) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let key_line = api_key
        .map(|k| format!("api_key = \"{k}\""))
        .unwrap_or_default();
    let toml = format!(
        r#"
[daemon]
{key_line}

[database]
path = "{}"

[action]
mode = "save"
output_dir = "{}"
"#,
        tmp.path().join("test.db").display(),
        tmp.path().join("out").display(),
    );
    let config: Config = load_config_from_str(&toml).unwrap();
    let (state, listener) = AppState::build(config).await.unwrap();
    let shutdown = state.pipeline.shutdown_signal();
    tokio::spawn(listener.run(shutdown));
    Fixture {
        router: create_router(Arc::clone(&state)),
        _tmp: tmp,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_is_ok() {
    let fixture = fixture(None).await;
    let response = fixture
        .router
        .oneshot(
            Request::builder()
                .uri("/api/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn metrics_endpoint_renders() {
    let fixture = fixture(None).await;
    let response = fixture
        .router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("reseeder_searchees"));
}

#[tokio::test]
async fn webhook_unknown_searchee_is_404() {
    let fixture = fixture(None).await;
    let response = fixture
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webhook")
                .header("content-type", "application/json")
                .body(Body::from(json!({"name": "nope"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn announce_is_queued() {
    let fixture = fixture(None).await;
    let event = json!({
        "indexer_id": "alpha",
        "guid": "g1",
        "name": "Show.S01E01-GRP",
        "link": "https://alpha.example/dl/g1.torrent",
        "size": 1000
    });
    let response = fixture
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/announce")
                .header("content-type", "application/json")
                .body(Body::from(event.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn status_reports_pipeline_and_config() {
    let fixture = fixture(None).await;
    let response = fixture
        .router
        .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["pipeline"]["searchees"], 0);
    assert_eq!(body["config"]["action"]["mode"], "save");
}

#[tokio::test]
async fn api_key_required_when_configured() {
    let fixture = fixture(Some("sekrit")).await;

    // No key: rejected.
    let response = fixture
        .router
        .clone()
        .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Correct key: accepted.
    let response = fixture
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/status")
                .header("x-api-key", "sekrit")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Health stays open for probes.
    let response = fixture
        .router
        .oneshot(
            Request::builder()
                .uri("/api/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
