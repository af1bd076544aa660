//! Rollup-aware query planning and execution
//!
//! This module answers range queries over a channel by stitching raw samples
//! and pre-aggregated rollup rows:
//! - Boundary resolution from the committed rollup rows
//! - Strategy selection (raw, grouped, counted/downsampled)
//! - Lazy tier chaining, calendar grouping and package downsampling
//!
//! # Architecture
//!
//! ```text
//! QueryRequest
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Validate   │  InvalidRange, UnknownGrouping, UnsupportedLevel
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Plan      │  level choice, boundary, tiers
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Execute    │  row count, then lazy tuple stream
//! └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use kuba_rollup::config::Config;
//! use kuba_rollup::engine::{MemoryRollupStore, MemorySampleStore};
//! use kuba_rollup::query::{QueryEngine, QueryRequest};
//! use kuba_rollup::types::ClientHint;
//!
//! let samples = MemorySampleStore::new();
//! samples.insert(1, 1_000, 2.0);
//! samples.insert(1, 2_000, 3.0);
//!
//! let engine = QueryEngine::new(samples, MemoryRollupStore::new(), &Config::default()).unwrap();
//! let request = QueryRequest::new(1).client(ClientHint::Raw);
//! let result = engine.plan_and_execute(&request).unwrap().collect().unwrap();
//! assert_eq!(result.row_count, 2);
//! ```

pub mod boundary;
pub mod engine;
pub mod executor;
pub mod operators;
pub mod planner;
pub mod result;

// Re-export main types
pub use engine::QueryEngine;
pub use executor::QueryExecutor;
pub use planner::{QueryPlan, QueryRequest, Strategy, Tier};
pub use result::{QueryOutput, QueryResult, TupleStream};
