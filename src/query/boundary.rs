//! Boundary Resolver - where the rollup store can stand in for raw samples
//!
//! Rollup rows are written bucket-at-a-time and lag behind ingestion (the
//! in-progress bucket is never rolled up), so the covered sub-range is always
//! derived from the committed rollup rows, never from wall-clock time.
//!
//! ```text
//!  buckets:  |  b0  |  b1  |  b2  |  b3  |  b4  |
//!  rollups:     r0     r1     r2     r3
//!  query:       [from ------------------------- to]
//!                      ^rollup_from          ^rollup_to
//! ```
//!
//! `b0` is skipped because `from` cuts through it; `rollup_to` is the start of
//! the bucket after the last row that lies before `to`, clipped to `to`.

use tracing::debug;

use crate::aggregation::AggregationLevel;
use crate::engine::traits::RollupStore;
use crate::error::StoreError;
use crate::types::{AggregationBoundary, ChannelId};

/// Resolve the rollup sub-range of `[from, to]` at `level`
///
/// Returns [`AggregationBoundary::none`] when the level has no rows in range;
/// the caller then has to serve the whole range from raw samples.
/// `rollup_from <= rollup_to` holds for every valid boundary.
pub fn resolve<R: RollupStore + ?Sized>(
    store: &R,
    channel: ChannelId,
    level: AggregationLevel,
    from: Option<i64>,
    to: Option<i64>,
    shift_buckets: u32,
) -> Result<AggregationBoundary, StoreError> {
    let Some(first) = store.first_at_or_after(channel, level, from)? else {
        debug!(channel, %level, "no rollup row at or after range start");
        return Ok(AggregationBoundary::none());
    };
    let Some(last) = store.last_before(channel, level, to)? else {
        debug!(channel, %level, "no rollup row before range end");
        return Ok(AggregationBoundary::none());
    };

    let mut rollup_from = first.bucket_start();
    if from.is_some_and(|from| rollup_from < from) {
        // Partially requested bucket, its row also holds samples before `from`
        rollup_from = level.offset(rollup_from, 1);
    }
    if shift_buckets > 0 {
        rollup_from = level.offset(rollup_from, i64::from(shift_buckets));
    }

    let mut rollup_to = level.offset(last.bucket_start(), 1);
    if let Some(to) = to {
        rollup_to = rollup_to.min(to);
    }
    let rollup_to = rollup_to.max(rollup_from);

    debug!(
        channel,
        %level,
        rollup_from,
        rollup_to,
        shift_buckets,
        "resolved rollup boundary"
    );

    Ok(AggregationBoundary {
        rollup_from: Some(rollup_from),
        rollup_to: Some(rollup_to),
    })
}
