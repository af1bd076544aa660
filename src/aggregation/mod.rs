//! Calendar aggregation: levels, reducers and rollup maintenance
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │           Raw Samples               │
//! │   (timestamp, value) per channel    │
//! └─────────────────────────────────────┘
//!                  ↓  RollupAggregator (full / delta)
//! ┌─────────────────────────────────────┐
//! │           Rollup Rows               │
//! │ one row per (channel, level, bucket)│
//! │  max timestamp, reduced value, count│
//! └─────────────────────────────────────┘
//!                  ↓  query planner
//! ┌─────────────────────────────────────┐
//! │         Stitched Results            │
//! │   raw-pre ∪ rollup-middle ∪ raw-post│
//! └─────────────────────────────────────┘
//! ```
//!
//! # Key Components
//!
//! - **AggregationLevel**: ranked calendar levels with UTC bucket arithmetic
//! - **Reducer**: associative value reduction selected per channel type
//! - **RollupAggregator**: writes complete buckets into the rollup store
//!
//! # Example
//!
//! ```rust
//! use kuba_rollup::aggregation::{AggregationLevel, Reducer};
//!
//! let level: AggregationLevel = "hour".parse().unwrap();
//! assert_eq!(level.truncate(3_600_000 + 42), 3_600_000);
//! assert_eq!(Reducer::Max.combine(2.0, 5.0), 5.0);
//! ```

pub mod level;
pub mod reducer;
pub mod rollup;

pub use level::AggregationLevel;
pub use reducer::Reducer;
pub use rollup::{AggregationMode, RollupAggregator};
