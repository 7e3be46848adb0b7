//! Prometheus metrics for the Spool server.
//!
//! Counters for artifact reads, ingest and retention sweeps, kept in a
//! process-wide registry and rendered by `GET /metrics`.
//!
//! # Security Note
//!
//! `/metrics` has no authentication. Labels carry status codes and outcomes,
//! never artifact ids, but the endpoint should still only be reachable by the
//! scraper: restrict it at the firewall or reverse proxy, or turn it off with
//! `server.metrics_enabled = false`.

use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TEXT_FORMAT, TextEncoder};
use std::sync::{LazyLock, Once};

/// Process-wide registry.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn counter(name: &str, help: &str) -> IntCounter {
    IntCounter::new(name, help).expect("counter name and help are valid")
}

fn counter_vec(name: &str, help: &str, label: &str) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help), &[label]).expect("counter name and help are valid")
}

// Read path
pub static ARTIFACT_RESPONSES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    counter_vec(
        "spool_artifact_responses_total",
        "Artifact route responses by HTTP status",
        "status",
    )
});

pub static BYTES_SERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "spool_bytes_served_total",
        "Artifact bytes streamed to clients",
    )
});

pub static UNSATISFIABLE_RANGES: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "spool_unsatisfiable_ranges_total",
        "Range requests answered with 416",
    )
});

pub static RATE_LIMITED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "spool_rate_limited_total",
        "Requests rejected by the per-client rate limiter",
    )
});

// Ingest
pub static ARTIFACTS_INGESTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    counter_vec(
        "spool_artifacts_ingested_total",
        "Ingest requests by outcome (created, duplicate)",
        "outcome",
    )
});

pub static BYTES_INGESTED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "spool_bytes_ingested_total",
        "Bytes of newly published artifacts",
    )
});

// Retention sweeps
pub static SWEEP_RUNS: LazyLock<IntCounter> =
    LazyLock::new(|| counter("spool_sweep_runs_total", "Completed retention sweeps"));

pub static SWEEP_DELETIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "spool_sweep_deletions_total",
        "Expired artifacts deleted by the sweeper",
    )
});

pub static SWEEP_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "spool_sweep_errors_total",
        "Sweep failures: listing errors, failed or timed-out deletes",
    )
});

static REGISTER: Once = Once::new();

/// Register every collector with [`REGISTRY`]. Later calls are no-ops.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: [Box<dyn Collector>; 9] = [
            Box::new(ARTIFACT_RESPONSES.clone()),
            Box::new(BYTES_SERVED.clone()),
            Box::new(UNSATISFIABLE_RANGES.clone()),
            Box::new(RATE_LIMITED.clone()),
            Box::new(ARTIFACTS_INGESTED.clone()),
            Box::new(BYTES_INGESTED.clone()),
            Box::new(SWEEP_RUNS.clone()),
            Box::new(SWEEP_DELETIONS.clone()),
            Box::new(SWEEP_ERRORS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::error!(error = %e, "Failed to register metric");
            }
        }
    });
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            b"metrics unavailable".to_vec(),
        );
    }
    (StatusCode::OK, [(CONTENT_TYPE, TEXT_FORMAT)], buffer)
}

/// Record an artifact route response by status code.
pub fn record_artifact_response(status: u16) {
    ARTIFACT_RESPONSES
        .with_label_values(&[status.to_string().as_str()])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();
        // Second call must not re-register
        register_metrics();
        assert!(!REGISTRY.gather().is_empty());
    }

    #[test]
    fn test_counters_appear_in_exposition() {
        register_metrics();
        record_artifact_response(206);
        SWEEP_RUNS.inc();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&REGISTRY.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("spool_artifact_responses_total{status=\"206\"}"));
        assert!(text.contains("spool_sweep_runs_total"));
    }
}
