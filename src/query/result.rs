//! Query result types
//!
//! [`QueryOutput`] is what `plan_and_execute` hands back: the row count, the
//! effective range and a lazy [`TupleStream`]. Collecting the stream yields a
//! serializable [`QueryResult`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregation::AggregationLevel;
use crate::engine::traits::RowStream;
use crate::error::{Result, StoreError};
use crate::query::planner::Strategy;
use crate::types::Tuple;

// ============================================================================
// Tuple Stream
// ============================================================================

/// Lazy, ordered sequence of result tuples
///
/// Tracks the tuples with the smallest and largest value seen so far; both
/// are exact once the stream is drained. Dropping the stream stops reading
/// from the stores.
pub struct TupleStream<'a> {
    /// Underlying operator pipeline
    inner: RowStream<'a, Tuple>,

    /// Tuple with the smallest value so far
    min: Option<Tuple>,

    /// Tuple with the largest value so far
    max: Option<Tuple>,

    /// Tuples yielded so far
    emitted: u64,
}

impl<'a> TupleStream<'a> {
    /// Wrap an operator pipeline
    pub fn new(inner: RowStream<'a, Tuple>) -> Self {
        Self {
            inner,
            min: None,
            max: None,
            emitted: 0,
        }
    }

    /// Stream that yields nothing
    pub fn empty() -> Self {
        Self::new(Box::new(std::iter::empty::<std::result::Result<Tuple, StoreError>>()))
    }

    /// Tuple with the smallest value seen, `None` until one was yielded
    pub fn min_tuple(&self) -> Option<Tuple> {
        self.min
    }

    /// Tuple with the largest value seen, `None` until one was yielded
    pub fn max_tuple(&self) -> Option<Tuple> {
        self.max
    }

    /// Number of tuples yielded so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Drain the remaining tuples
    pub fn drain_all(&mut self) -> Result<Vec<Tuple>> {
        self.by_ref().collect()
    }

    fn observe(&mut self, tuple: &Tuple) {
        self.emitted += 1;
        if self.min.map_or(true, |min| tuple.value < min.value) {
            self.min = Some(*tuple);
        }
        if self.max.map_or(true, |max| tuple.value > max.value) {
            self.max = Some(*tuple);
        }
    }
}

impl Iterator for TupleStream<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next()? {
            Ok(tuple) => {
                self.observe(&tuple);
                Some(Ok(tuple))
            }
            Err(e) => Some(Err(e.into())),
        }
    }
}

impl fmt::Debug for TupleStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TupleStream")
            .field("emitted", &self.emitted)
            .field("min", &self.min)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Query Output
// ============================================================================

/// Output of one executed query
#[derive(Debug)]
pub struct QueryOutput<'a> {
    /// Number of tuples the query represents after reduction
    pub row_count: u64,

    /// Timestamp of the first sample in range, unset for empty results
    pub range_from: Option<i64>,

    /// Timestamp of the last sample in range, unset for empty results
    pub range_to: Option<i64>,

    /// Strategy that produced the tuples
    pub strategy: Strategy,

    /// Rollup level the middle tier was read from
    pub rollup_level: Option<AggregationLevel>,

    /// Result tuples in ascending timestamp order
    pub tuples: TupleStream<'a>,
}

impl QueryOutput<'_> {
    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Drain the tuples into a [`QueryResult`]
    pub fn collect(mut self) -> Result<QueryResult> {
        let tuples = self.tuples.drain_all()?;
        Ok(QueryResult {
            row_count: self.row_count,
            range_from: self.range_from,
            range_to: self.range_to,
            strategy: self.strategy,
            min: self.tuples.min_tuple(),
            max: self.tuples.max_tuple(),
            tuples,
        })
    }
}

/// Fully materialized query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Number of tuples the query represents after reduction
    pub row_count: u64,

    /// Timestamp of the first sample in range
    pub range_from: Option<i64>,

    /// Timestamp of the last sample in range
    pub range_to: Option<i64>,

    /// Strategy that produced the tuples
    pub strategy: Strategy,

    /// Tuple with the smallest value
    pub min: Option<Tuple>,

    /// Tuple with the largest value
    pub max: Option<Tuple>,

    /// Result tuples
    pub tuples: Vec<Tuple>,
}

impl QueryResult {
    /// Sum of `count` over all tuples
    pub fn sample_count(&self) -> u64 {
        self.tuples.iter().map(|t| t.count).sum()
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Convert to pretty-printed JSON string
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}
