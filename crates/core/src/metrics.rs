//! Prometheus metrics for the conversion engine.
//!
//! This module provides metrics for:
//! - Conversions (results, duration, failures by kind)
//! - Engine lifecycle (loads)
//! - Isolated worker traffic

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Conversion Metrics
// =============================================================================

/// Conversions total by result.
pub static CONVERSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidmp3_conversions_total", "Total conversions attempted"),
        &["result"], // "completed", "failed", "abandoned"
    )
    .unwrap()
});

/// Conversion duration in seconds by adapter.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vidmp3_conversion_duration_seconds",
            "Wall-clock duration of a transcode",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0]),
        &["adapter"], // "direct", "isolated"
    )
    .unwrap()
});

/// Failures by error kind.
pub static CONVERSION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vidmp3_conversion_failures_total",
            "Total failures by error kind",
        ),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics
// =============================================================================

/// Engine loads by result.
pub static ENGINE_LOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidmp3_engine_loads_total", "Total engine initializations"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Requests sent to the isolated worker by type.
pub static WORKER_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vidmp3_worker_requests_total",
            "Total requests sent to the isolated worker",
        ),
        &["type"], // "load", "convert", "terminate"
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CONVERSIONS.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(CONVERSION_FAILURES.clone()),
        Box::new(ENGINE_LOADS.clone()),
        Box::new(WORKER_REQUESTS.clone()),
    ]
}
