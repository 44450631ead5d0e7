//! Prometheus metrics for the Urumi server.
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus
//! scraping; restrict it at the network level in production.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static STORES_PROVISIONED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "urumi_stores_provisioned_total",
        "Total number of stores that reached ready",
    )
    .expect("metric creation failed")
});

pub static STORES_PROVISION_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "urumi_stores_provision_failed_total",
        "Total number of provisioning runs that failed",
    )
    .expect("metric creation failed")
});

pub static STORES_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "urumi_stores_deleted_total",
        "Total number of stores deleted",
    )
    .expect("metric creation failed")
});

pub static PROVISION_WORKERS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "urumi_provision_workers_active",
        "Provisioning workers currently running",
    )
    .expect("metric creation failed")
});

pub static PROVISION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "urumi_provision_duration_seconds",
            "Time from admission to ready",
        )
        .buckets(vec![5.0, 15.0, 30.0, 60.0, 90.0, 120.0, 180.0, 240.0, 300.0]),
    )
    .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let registry = &*REGISTRY;
        registry
            .register(Box::new(STORES_PROVISIONED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(STORES_PROVISION_FAILED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(STORES_DELETED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(PROVISION_WORKERS_ACTIVE.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(PROVISION_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %err, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response();
    }
    (
        StatusCode::OK,
        [("Content-Type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        register_metrics();
        register_metrics();
        STORES_PROVISIONED.inc();
        assert!(STORES_PROVISIONED.get() >= 1);
    }
}
