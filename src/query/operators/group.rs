//! Calendar grouping
//!
//! Reduces all tuples whose timestamps truncate to the same bucket at the
//! requested level into one tuple. Raw rows carry `count = 1` and rollup rows
//! their own count, so a stitched stream groups exactly like a raw scan.

use crate::aggregation::{AggregationLevel, Reducer};
use crate::error::StoreError;
use crate::query::operators::ReduceByKey;
use crate::types::Tuple;

/// Group an ascending stream by calendar bucket
pub fn group_by_level<I>(
    input: I,
    level: AggregationLevel,
    reducer: Reducer,
) -> ReduceByKey<I, impl FnMut(&Tuple) -> i64, i64>
where
    I: Iterator<Item = Result<Tuple, StoreError>>,
{
    ReduceByKey::new(input, move |tuple: &Tuple| level.truncate(tuple.timestamp), reducer)
}

/// Number of distinct buckets in an ascending stream
pub fn count_groups<I>(input: I, level: AggregationLevel) -> Result<u64, StoreError>
where
    I: Iterator<Item = Result<Tuple, StoreError>>,
{
    let mut groups = 0u64;
    let mut current = None;
    for tuple in input {
        let key = level.truncate(tuple?.timestamp);
        if current != Some(key) {
            groups += 1;
            current = Some(key);
        }
    }
    Ok(groups)
}
