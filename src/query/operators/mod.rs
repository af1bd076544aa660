//! Query Operators - Streaming reduction primitives
//!
//! This module provides the building blocks for query execution:
//! - Tier chaining for stitching raw and rollup scans into one stream
//! - Calendar grouping for `groupBy` requests
//! - Package downsampling for target tuple counts
//!
//! All operators are pull-based iterators over `Result<Tuple, StoreError>`.
//! They hold at most one pending tuple, so dropping the output stream stops
//! consumption from the stores immediately.

pub mod chain;
pub mod downsample;
pub mod group;

pub use chain::TierChain;
pub use downsample::{downsample, PackageSpec};
pub use group::{count_groups, group_by_level};

use crate::aggregation::Reducer;
use crate::error::StoreError;
use crate::types::Tuple;

// ============================================================================
// ReduceByKey
// ============================================================================

/// Merge runs of consecutive tuples that share a key
///
/// The input must be ordered so that equal keys are adjacent, which holds
/// for calendar buckets and package indices over an ascending stream. Each
/// run is folded with [`Tuple::merge`]: max timestamp, reduced value and
/// summed count.
///
/// A store error is yielded once, the pending group is discarded and the
/// stream ends.
pub struct ReduceByKey<I, F, K> {
    /// Ordered input
    input: I,

    /// Key of each tuple; called exactly once per tuple, in order
    key_of: F,

    /// Value reducer
    reducer: Reducer,

    /// Group being accumulated
    pending: Option<(K, Tuple)>,

    /// Input exhausted or failed
    finished: bool,
}

impl<I, F, K> ReduceByKey<I, F, K>
where
    I: Iterator<Item = Result<Tuple, StoreError>>,
    F: FnMut(&Tuple) -> K,
    K: PartialEq,
{
    /// Create a new keyed reduction
    pub fn new(input: I, key_of: F, reducer: Reducer) -> Self {
        Self {
            input,
            key_of,
            reducer,
            pending: None,
            finished: false,
        }
    }
}

impl<I, F, K> Iterator for ReduceByKey<I, F, K>
where
    I: Iterator<Item = Result<Tuple, StoreError>>,
    F: FnMut(&Tuple) -> K,
    K: PartialEq,
{
    type Item = Result<Tuple, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            match self.input.next() {
                Some(Ok(tuple)) => {
                    let key = (self.key_of)(&tuple);
                    if let Some((pending_key, acc)) = self.pending.as_mut() {
                        if *pending_key == key {
                            acc.merge(&tuple, self.reducer);
                            continue;
                        }
                    }
                    if let Some((_, done)) = self.pending.replace((key, tuple)) {
                        return Some(Ok(done));
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    self.pending = None;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    return self.pending.take().map(|(_, tuple)| Ok(tuple));
                }
            }
        }
    }
}
