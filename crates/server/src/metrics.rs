//! Prometheus metrics.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("register http requests");
    registry
        .register(Box::new(WEBHOOK_DECISIONS_TOTAL.clone()))
        .expect("register webhook decisions");
    registry
        .register(Box::new(ANNOUNCES_TOTAL.clone()))
        .expect("register announces");
    registry
        .register(Box::new(SEARCHEES.clone()))
        .expect("register searchees gauge");
    registry
        .register(Box::new(INFLIGHT_DECISIONS.clone()))
        .expect("register inflight gauge");
    registry
});

/// HTTP requests by path and status.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reseeder_http_requests_total", "Total HTTP requests"),
        &["path", "status"],
    )
    .expect("http requests metric")
});

/// Decisions produced by webhook-triggered cycles, by kind.
pub static WEBHOOK_DECISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reseeder_webhook_decisions_total",
            "Decisions from webhook-triggered search cycles",
        ),
        &["decision"],
    )
    .expect("webhook decisions metric")
});

/// Announce events accepted into the queue.
pub static ANNOUNCES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reseeder_announces_total", "Announce events received"),
        &["outcome"],
    )
    .expect("announces metric")
});

/// Searchees currently indexed, refreshed at scrape time.
pub static SEARCHEES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("reseeder_searchees", "Searchees currently indexed").expect("searchees gauge")
});

/// Decision computations currently in flight, refreshed at scrape time.
pub static INFLIGHT_DECISIONS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reseeder_inflight_decisions",
        "Decision computations currently in flight",
    )
    .expect("inflight gauge")
});

/// Render the registry in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
