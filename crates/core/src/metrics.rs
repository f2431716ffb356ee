//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestration runs and fetched batches
//! - Submission outcomes
//! - Stage durations and retries

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Run Metrics
// =============================================================================

/// Orchestration runs by result.
pub static RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("evalflow_runs_total", "Total orchestration runs"),
        &["result"], // "completed", "empty", "fatal"
    )
    .unwrap()
});

/// Submissions returned per fetch.
pub static FETCHED_BATCH_SIZE: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "evalflow_fetched_batch_size",
            "Number of submissions returned by one fetch",
        )
        .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        &["topology"],
    )
    .unwrap()
});

// =============================================================================
// Submission Metrics
// =============================================================================

/// Submissions reaching a terminal state, by outcome.
pub static SUBMISSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "evalflow_submissions_total",
            "Submissions processed to a terminal state",
        ),
        &["topology", "outcome"], // "notified", "scored", "rejected", "failed"
    )
    .unwrap()
});

// =============================================================================
// Stage Metrics
// =============================================================================

/// Stage duration in seconds, retries included.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "evalflow_stage_duration_seconds",
            "Duration of one stage for one submission",
        )
        .buckets(vec![
            0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0,
        ]),
        &["stage", "outcome"], // outcome: "ok", "rejected", "failed"
    )
    .unwrap()
});

/// Retries performed by stage.
pub static STAGE_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("evalflow_stage_retries_total", "Stage attempts that were retried"),
        &["stage"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(RUNS_TOTAL.clone()),
        Box::new(FETCHED_BATCH_SIZE.clone()),
        Box::new(SUBMISSIONS_TOTAL.clone()),
        Box::new(STAGE_DURATION.clone()),
        Box::new(STAGE_RETRIES.clone()),
    ]
}
