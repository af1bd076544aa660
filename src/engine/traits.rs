//! Collaborator traits consumed by the query engine
//!
//! The engine never owns storage. It reads raw samples through
//! [`SampleStore`], pre-aggregated rows through [`RollupStore`], and asks an
//! [`AggregationSwitch`] whether rollups may be used at all. The rollup
//! maintenance job additionally writes through [`RollupWriter`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::aggregation::AggregationLevel;
use crate::error::StoreError;
use crate::query::boundary;
use crate::types::{AggregationBoundary, ChannelId, RollupRow, Sample, ScanRange};

/// Lazy, finite, ascending row stream
///
/// Not restartable; dropping it stops consumption from the store.
pub type RowStream<'a, T> = Box<dyn Iterator<Item = Result<T, StoreError>> + Send + 'a>;

// =============================================================================
// SampleStore Trait
// =============================================================================

/// Read-only accessor over raw samples
pub trait SampleStore: Send + Sync {
    /// Number of samples in the range
    fn count(&self, channel: ChannelId, range: &ScanRange) -> Result<u64, StoreError>;

    /// Samples in the range, ascending by timestamp
    fn scan(&self, channel: ChannelId, range: &ScanRange)
        -> Result<RowStream<'_, Sample>, StoreError>;

    /// Latest sample with `timestamp < t`
    fn nearest_before(&self, channel: ChannelId, t: i64) -> Result<Option<Sample>, StoreError>;

    /// Earliest sample with `timestamp > t`
    fn nearest_after(&self, channel: ChannelId, t: i64) -> Result<Option<Sample>, StoreError>;
}

// =============================================================================
// RollupStore Trait
// =============================================================================

/// Accessor over pre-aggregated rows keyed by `(channel, level, bucket)`
///
/// Row timestamps are the max timestamp of the bucket's samples, so every
/// range below filters on that value.
pub trait RollupStore: Send + Sync {
    /// Row counts per level, ordered by rank, restricted to `level <= max_level`
    fn row_counts_by_level(
        &self,
        channel: ChannelId,
        max_level: Option<AggregationLevel>,
    ) -> Result<Vec<(AggregationLevel, u64)>, StoreError>;

    /// Earliest row with `timestamp >= from` (any row when `from` is `None`)
    fn first_at_or_after(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        from: Option<i64>,
    ) -> Result<Option<RollupRow>, StoreError>;

    /// Latest row with `timestamp < to` (any row when `to` is `None`)
    fn last_before(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        to: Option<i64>,
    ) -> Result<Option<RollupRow>, StoreError>;

    /// Rows in the range, ascending by timestamp
    fn scan(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        range: &ScanRange,
    ) -> Result<RowStream<'_, RollupRow>, StoreError>;

    /// Number of rows in the range
    fn row_count(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        range: &ScanRange,
    ) -> Result<u64, StoreError> {
        self.scan(channel, level, range)?
            .try_fold(0u64, |acc, row| row.map(|_| acc + 1))
    }

    /// Sum of `count` over the rows in the range
    fn sample_count(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        range: &ScanRange,
    ) -> Result<u64, StoreError> {
        self.scan(channel, level, range)?
            .try_fold(0u64, |acc, row| row.map(|row| acc + row.count))
    }

    /// Sub-range of `[from, to]` with contiguous rollup coverage at `level`
    ///
    /// `shift_buckets` moves the start forward by that many buckets.
    fn boundary(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        from: Option<i64>,
        to: Option<i64>,
        shift_buckets: u32,
    ) -> Result<AggregationBoundary, StoreError> {
        boundary::resolve(self, channel, level, from, to, shift_buckets)
    }
}

/// Write access used by the rollup maintenance job
pub trait RollupWriter: RollupStore {
    /// Insert or replace rows for one `(channel, level)` atomically
    ///
    /// A row replaces an existing row of the same calendar bucket. Returns the
    /// number of rows written.
    fn replace_rows(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        rows: Vec<RollupRow>,
    ) -> Result<usize, StoreError>;

    /// Remove rollup rows of one level, or of every level
    fn clear(&self, level: Option<AggregationLevel>) -> Result<usize, StoreError>;
}

// =============================================================================
// AggregationSwitch Trait
// =============================================================================

/// Global rollup feature flag
pub trait AggregationSwitch: Send + Sync {
    /// Whether rollup rows may be used by queries
    fn is_aggregation_enabled(&self) -> bool;
}

impl AggregationSwitch for bool {
    fn is_aggregation_enabled(&self) -> bool {
        *self
    }
}

impl AggregationSwitch for AtomicBool {
    fn is_aggregation_enabled(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

// =============================================================================
// Shared handles
// =============================================================================

impl<T: SampleStore + ?Sized> SampleStore for Arc<T> {
    fn count(&self, channel: ChannelId, range: &ScanRange) -> Result<u64, StoreError> {
        (**self).count(channel, range)
    }

    fn scan(
        &self,
        channel: ChannelId,
        range: &ScanRange,
    ) -> Result<RowStream<'_, Sample>, StoreError> {
        (**self).scan(channel, range)
    }

    fn nearest_before(&self, channel: ChannelId, t: i64) -> Result<Option<Sample>, StoreError> {
        (**self).nearest_before(channel, t)
    }

    fn nearest_after(&self, channel: ChannelId, t: i64) -> Result<Option<Sample>, StoreError> {
        (**self).nearest_after(channel, t)
    }
}

impl<T: RollupStore + ?Sized> RollupStore for Arc<T> {
    fn row_counts_by_level(
        &self,
        channel: ChannelId,
        max_level: Option<AggregationLevel>,
    ) -> Result<Vec<(AggregationLevel, u64)>, StoreError> {
        (**self).row_counts_by_level(channel, max_level)
    }

    fn first_at_or_after(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        from: Option<i64>,
    ) -> Result<Option<RollupRow>, StoreError> {
        (**self).first_at_or_after(channel, level, from)
    }

    fn last_before(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        to: Option<i64>,
    ) -> Result<Option<RollupRow>, StoreError> {
        (**self).last_before(channel, level, to)
    }

    fn scan(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        range: &ScanRange,
    ) -> Result<RowStream<'_, RollupRow>, StoreError> {
        (**self).scan(channel, level, range)
    }

    fn row_count(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        range: &ScanRange,
    ) -> Result<u64, StoreError> {
        (**self).row_count(channel, level, range)
    }

    fn sample_count(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        range: &ScanRange,
    ) -> Result<u64, StoreError> {
        (**self).sample_count(channel, level, range)
    }

    fn boundary(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        from: Option<i64>,
        to: Option<i64>,
        shift_buckets: u32,
    ) -> Result<AggregationBoundary, StoreError> {
        (**self).boundary(channel, level, from, to, shift_buckets)
    }
}

impl<T: RollupWriter + ?Sized> RollupWriter for Arc<T> {
    fn replace_rows(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        rows: Vec<RollupRow>,
    ) -> Result<usize, StoreError> {
        (**self).replace_rows(channel, level, rows)
    }

    fn clear(&self, level: Option<AggregationLevel>) -> Result<usize, StoreError> {
        (**self).clear(level)
    }
}

impl<T: AggregationSwitch + ?Sized> AggregationSwitch for Arc<T> {
    fn is_aggregation_enabled(&self) -> bool {
        (**self).is_aggregation_enabled()
    }
}
