//! Prometheus metrics for the Shipwright server.
//!
//! Counters cover release sequencing, deploy bookkeeping, GitOps error reports and
//! registry credential migration. Labels never carry app or cluster ids.
//!
//! The `/metrics` endpoint is unauthenticated so Prometheus can scrape it. Restrict it
//! at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{self, Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Version sequencing
pub static MIDSTREAM_VERSIONS_RECORDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shipwright_midstream_versions_recorded_total",
        "Total number of midstream versions created or replaced",
    )
    .expect("metric creation failed")
});

pub static DOWNSTREAM_VERSIONS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shipwright_downstream_versions_created_total",
        "Total number of downstream versions allocated",
    )
    .expect("metric creation failed")
});

pub static DEPLOYS_MARKED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shipwright_deploys_marked_total",
        "Total number of downstream versions marked deployed",
    )
    .expect("metric creation failed")
});

pub static APPLY_OUTPUTS_RECORDED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "shipwright_apply_outputs_recorded_total",
            "Total number of apply agent reports by result",
        ),
        &["result"],
    )
    .expect("metric creation failed")
});

// GitOps
pub static GITOPS_ERRORS_RECORDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shipwright_gitops_errors_recorded_total",
        "Total number of GitOps errors stored on a destination",
    )
    .expect("metric creation failed")
});

// Registry credentials
pub static REGISTRY_PASSWORDS_MIGRATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shipwright_registry_passwords_migrated_total",
        "Total number of plaintext registry passwords moved to ciphertext",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build several routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(MIDSTREAM_VERSIONS_RECORDED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOWNSTREAM_VERSIONS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DEPLOYS_MARKED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(APPLY_OUTPUTS_RECORDED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(GITOPS_ERRORS_RECORDED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REGISTRY_PASSWORDS_MIGRATED.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record an apply agent report.
pub fn record_apply_output(is_error: bool) {
    let result = if is_error { "error" } else { "success" };
    APPLY_OUTPUTS_RECORDED.with_label_values(&[result]).inc();
}
