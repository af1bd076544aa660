//! Kuba Rollup - rollup-aware range queries over irregular time-series channels
//!
//! This library answers range queries that return raw samples, samples grouped
//! by calendar period, or samples downsampled to a target tuple count, while
//! reading as much as possible from a pre-aggregated rollup store:
//! - Exact rollup boundaries derived from the committed rollup rows
//! - Stitched raw/rollup/raw scans without double counting or gaps
//! - Calendar grouping and package downsampling with associative reducers
//! - Rollup maintenance (full and delta modes)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregation;
pub mod engine;
pub mod error;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Query planning, stitching and execution
/// Provides boundary resolution, strategy selection, grouping and downsampling
pub mod query;

// Re-export main types
pub use aggregation::{AggregationLevel, Reducer};
pub use config::Config;
pub use error::{Error, Result};
pub use query::{QueryEngine, QueryOutput, QueryRequest};
pub use types::{ChannelId, ClientHint, RollupRow, Sample, Tuple};
