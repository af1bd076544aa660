//! Storage collaborators of the query engine
//!
//! The engine is generic over its stores. [`traits`] defines the accessor
//! contracts and [`stubs`] provides in-memory implementations for tests,
//! benchmarks and embedding.

pub mod stubs;
pub mod traits;

pub use stubs::{MemoryRollupStore, MemorySampleStore};
pub use traits::{AggregationSwitch, RollupStore, RollupWriter, RowStream, SampleStore};
