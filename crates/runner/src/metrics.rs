//! Prometheus metrics for the daemon.
//!
//! This module provides metrics for monitoring the evaluation daemon:
//! - HTTP request metrics (latency, counts)
//! - Orchestrator status (collected dynamically)
//! - Core pipeline metrics registered from `evalflow_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "evalflow_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("evalflow_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "evalflow_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Orchestrator Metrics (collected dynamically)
// =============================================================================

/// Polling loop state (1 = running, 0 = stopped).
pub static ORCHESTRATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "evalflow_orchestrator_running",
        "Whether the polling loop is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Whether a run is in progress.
pub static RUN_IN_PROGRESS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "evalflow_run_in_progress",
        "Whether an orchestration run is in progress (1) or not (0)",
    )
    .unwrap()
});

/// Submissions in the most recent completed run, by outcome.
pub static LAST_RUN_SUBMISSIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "evalflow_last_run_submissions",
            "Submissions in the most recent run by outcome",
        ),
        &["outcome"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Orchestrator
    registry
        .register(Box::new(ORCHESTRATOR_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(RUN_IN_PROGRESS.clone()))
        .unwrap();
    registry
        .register(Box::new(LAST_RUN_SUBMISSIONS.clone()))
        .unwrap();

    // Core metrics (runs, submissions, stages)
    for metric in evalflow_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the orchestrator right now.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.orchestrator().status().await;
    ORCHESTRATOR_RUNNING.set(i64::from(status.running));
    RUN_IN_PROGRESS.set(i64::from(status.run_in_progress));

    if let Some(run) = status.last_run {
        LAST_RUN_SUBMISSIONS
            .with_label_values(&["completed"])
            .set(run.completed as i64);
        LAST_RUN_SUBMISSIONS
            .with_label_values(&["notified"])
            .set(run.notified as i64);
        LAST_RUN_SUBMISSIONS
            .with_label_values(&["failed"])
            .set(run.failed as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_core_metrics() {
        evalflow_core::metrics::RUNS_TOTAL
            .with_label_values(&["empty"])
            .inc();
        HTTP_REQUESTS_IN_FLIGHT.set(0);

        let text = encode_metrics();
        assert!(text.contains("evalflow_runs_total"));
        assert!(text.contains("evalflow_http_requests_in_flight"));
    }
}
