//! Metrics and telemetry for the rollup query engine
//!
//! This module provides Prometheus metrics for query strategies, rollup
//! boundary hits, rollup maintenance writes and errors.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // === Query Counters ===

    /// Executed queries by strategy
    pub static ref QUERIES_TOTAL: CounterVec = register_counter_vec!(
        "kuba_rollup_queries_total",
        "Total executed queries by strategy",
        &["strategy"]
    ).unwrap();

    /// Boundary resolutions by outcome
    pub static ref BOUNDARY_TOTAL: CounterVec = register_counter_vec!(
        "kuba_rollup_boundary_total",
        "Rollup boundary resolutions by outcome (hit, miss)",
        &["outcome"]
    ).unwrap();

    // === Latency Histograms ===

    /// Planning plus count query duration
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "kuba_rollup_query_duration_seconds",
        "Query planning and count latency in seconds",
        &["strategy"],
        vec![0.0001, 0.001, 0.01, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    // === Maintenance Counters ===

    /// Rollup rows written by level
    pub static ref ROWS_WRITTEN_TOTAL: CounterVec = register_counter_vec!(
        "kuba_rollup_rows_written_total",
        "Total rollup rows written by level",
        &["level"]
    ).unwrap();

    // === Error Counters ===

    /// Total errors by type
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "kuba_rollup_errors_total",
        "Total errors by type and operation",
        &["error_type", "operation"]
    ).unwrap();
}

/// Initialize metrics system
///
/// Registers every collector so that the exposition lists them before the
/// first query runs.
pub fn init() {
    lazy_static::initialize(&QUERIES_TOTAL);
    lazy_static::initialize(&BOUNDARY_TOTAL);
    lazy_static::initialize(&QUERY_DURATION);
    lazy_static::initialize(&ROWS_WRITTEN_TOTAL);
    lazy_static::initialize(&ERRORS_TOTAL);

    tracing::info!("Metrics system initialized");
}

/// Get metrics in Prometheus text format
///
/// # Returns
///
/// Result containing the formatted metrics string, or an error if encoding fails
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record an executed query
#[inline]
pub fn record_query(strategy: &str, duration_secs: f64) {
    QUERIES_TOTAL.with_label_values(&[strategy]).inc();
    QUERY_DURATION
        .with_label_values(&[strategy])
        .observe(duration_secs);
}

/// Record a boundary resolution
#[inline]
pub fn record_boundary(valid: bool) {
    let outcome = if valid { "hit" } else { "miss" };
    BOUNDARY_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record rollup rows written
#[inline]
pub fn record_rollup_write(level: &str, rows: usize) {
    ROWS_WRITTEN_TOTAL
        .with_label_values(&[level])
        .inc_by(rows as f64);
}

/// Record an error
#[inline]
pub fn record_error(error_type: &str, operation: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, operation])
        .inc();
}
