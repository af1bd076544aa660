//! In-memory implementations of the store collaborators.
//!
//! These implementations are intended for:
//! - **Unit testing** the planner without a database
//! - **Integration testing** the stitched raw/rollup queries
//! - **Benchmarking** grouping and downsampling
//!
//! # Available Stubs
//!
//! - [`MemorySampleStore`]: raw samples per channel in a `BTreeMap`
//! - [`MemoryRollupStore`]: rollup rows per `(channel, level)`, one row per bucket
//!
//! # Warning
//!
//! **These stubs are NOT suitable for production use:** all data is lost on
//! drop, and scans copy the selected range before streaming it.
//!
//! # Example
//!
//! ```rust
//! use kuba_rollup::engine::stubs::MemorySampleStore;
//! use kuba_rollup::engine::traits::SampleStore;
//! use kuba_rollup::types::ScanRange;
//!
//! let samples = MemorySampleStore::new();
//! samples.insert(1, 1_000, 4.0);
//! samples.insert(1, 2_000, 6.0);
//!
//! let range = ScanRange::closed(Some(0), Some(1_500));
//! assert_eq!(samples.count(1, &range).unwrap(), 1);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use parking_lot::RwLock;

use crate::aggregation::AggregationLevel;
use crate::engine::traits::{RollupStore, RollupWriter, RowStream, SampleStore};
use crate::error::StoreError;
use crate::types::{ChannelId, RollupRow, Sample, ScanRange};

/// Map a scan range onto `BTreeMap::range` bounds
///
/// Callers must reject empty ranges first, `BTreeMap::range` panics on them.
fn key_bounds(range: &ScanRange) -> (Bound<i64>, Bound<i64>) {
    let start = range.from.map_or(Bound::Unbounded, Bound::Included);
    let end = match range.to {
        None => Bound::Unbounded,
        Some(to) if range.to_inclusive => Bound::Included(to),
        Some(to) => Bound::Excluded(to),
    };
    (start, end)
}

// =============================================================================
// Sample Store
// =============================================================================

/// In-memory raw sample store
///
/// Samples with an equal timestamp replace each other.
#[derive(Debug, Default)]
pub struct MemorySampleStore {
    /// channel -> timestamp -> value
    channels: RwLock<HashMap<ChannelId, BTreeMap<i64, f64>>>,
}

impl MemorySampleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample
    pub fn insert(&self, channel: ChannelId, timestamp: i64, value: f64) {
        self.channels
            .write()
            .entry(channel)
            .or_default()
            .insert(timestamp, value);
    }

    /// Append many samples
    pub fn extend<I>(&self, channel: ChannelId, samples: I)
    where
        I: IntoIterator<Item = Sample>,
    {
        let mut channels = self.channels.write();
        let series = channels.entry(channel).or_default();
        for sample in samples {
            series.insert(sample.timestamp, sample.value);
        }
    }

    /// Number of samples stored for a channel
    pub fn len(&self, channel: ChannelId) -> usize {
        self.channels.read().get(&channel).map_or(0, BTreeMap::len)
    }

    /// Whether a channel has no samples
    pub fn is_empty(&self, channel: ChannelId) -> bool {
        self.len(channel) == 0
    }

    fn collect(&self, channel: ChannelId, range: &ScanRange) -> Vec<Sample> {
        if range.is_empty() {
            return Vec::new();
        }
        self.channels
            .read()
            .get(&channel)
            .map(|series| {
                series
                    .range(key_bounds(range))
                    .map(|(&timestamp, &value)| Sample::new(timestamp, value))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl SampleStore for MemorySampleStore {
    fn count(&self, channel: ChannelId, range: &ScanRange) -> Result<u64, StoreError> {
        if range.is_empty() {
            return Ok(0);
        }
        let channels = self.channels.read();
        let count = channels
            .get(&channel)
            .map_or(0, |series| series.range(key_bounds(range)).count());
        Ok(count as u64)
    }

    fn scan(
        &self,
        channel: ChannelId,
        range: &ScanRange,
    ) -> Result<RowStream<'_, Sample>, StoreError> {
        Ok(Box::new(self.collect(channel, range).into_iter().map(Ok)))
    }

    fn nearest_before(&self, channel: ChannelId, t: i64) -> Result<Option<Sample>, StoreError> {
        let channels = self.channels.read();
        Ok(channels.get(&channel).and_then(|series| {
            series
                .range(..t)
                .next_back()
                .map(|(&timestamp, &value)| Sample::new(timestamp, value))
        }))
    }

    fn nearest_after(&self, channel: ChannelId, t: i64) -> Result<Option<Sample>, StoreError> {
        let channels = self.channels.read();
        Ok(channels.get(&channel).and_then(|series| {
            series
                .range((Bound::Excluded(t), Bound::Unbounded))
                .next()
                .map(|(&timestamp, &value)| Sample::new(timestamp, value))
        }))
    }
}

// =============================================================================
// Rollup Store
// =============================================================================

/// In-memory rollup store
///
/// Rows are keyed by their bucket start, so there is at most one row per
/// calendar bucket and level. Row timestamps grow with the bucket key.
#[derive(Debug, Default)]
pub struct MemoryRollupStore {
    /// (channel, level) -> bucket start -> row
    rows: RwLock<HashMap<(ChannelId, AggregationLevel), BTreeMap<i64, RollupRow>>>,
}

impl MemoryRollupStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored for a channel and level
    pub fn len(&self, channel: ChannelId, level: AggregationLevel) -> usize {
        self.rows.read().get(&(channel, level)).map_or(0, BTreeMap::len)
    }

    /// Total number of rows across channels and levels
    pub fn total_rows(&self) -> usize {
        self.rows.read().values().map(BTreeMap::len).sum()
    }

    /// All rows of a channel and level, ascending
    pub fn rows(&self, channel: ChannelId, level: AggregationLevel) -> Vec<RollupRow> {
        self.rows
            .read()
            .get(&(channel, level))
            .map(|rows| rows.values().copied().collect())
            .unwrap_or_default()
    }
}

impl RollupStore for MemoryRollupStore {
    fn row_counts_by_level(
        &self,
        channel: ChannelId,
        max_level: Option<AggregationLevel>,
    ) -> Result<Vec<(AggregationLevel, u64)>, StoreError> {
        let rows = self.rows.read();
        Ok(AggregationLevel::ALL
            .into_iter()
            .filter(|level| max_level.map_or(true, |max| *level <= max))
            .filter_map(|level| {
                let count = rows.get(&(channel, level)).map_or(0, BTreeMap::len);
                (count > 0).then_some((level, count as u64))
            })
            .collect())
    }

    fn first_at_or_after(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        from: Option<i64>,
    ) -> Result<Option<RollupRow>, StoreError> {
        let rows = self.rows.read();
        let Some(series) = rows.get(&(channel, level)) else {
            return Ok(None);
        };
        let found = match from {
            None => series.values().next().copied(),
            Some(from) => series
                .range(level.truncate(from)..)
                .map(|(_, row)| row)
                .find(|row| row.timestamp >= from)
                .copied(),
        };
        Ok(found)
    }

    fn last_before(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        to: Option<i64>,
    ) -> Result<Option<RollupRow>, StoreError> {
        let rows = self.rows.read();
        let Some(series) = rows.get(&(channel, level)) else {
            return Ok(None);
        };
        let found = match to {
            None => series.values().next_back().copied(),
            Some(to) => series
                .range(..=level.truncate(to))
                .rev()
                .map(|(_, row)| row)
                .find(|row| row.timestamp < to)
                .copied(),
        };
        Ok(found)
    }

    fn scan(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        range: &ScanRange,
    ) -> Result<RowStream<'_, RollupRow>, StoreError> {
        let selected: Vec<RollupRow> = if range.is_empty() {
            Vec::new()
        } else {
            self.rows
                .read()
                .get(&(channel, level))
                .map(|series| {
                    series
                        .values()
                        .filter(|row| range.contains(row.timestamp))
                        .copied()
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(Box::new(selected.into_iter().map(Ok)))
    }
}

impl RollupWriter for MemoryRollupStore {
    fn replace_rows(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        rows: Vec<RollupRow>,
    ) -> Result<usize, StoreError> {
        if let Some(row) = rows
            .iter()
            .find(|row| row.channel_id != channel || row.level != level)
        {
            return Err(StoreError::Backend(format!(
                "row for channel {} level {} written to channel {} level {}",
                row.channel_id, row.level, channel, level
            )));
        }

        let written = rows.len();
        let mut all = self.rows.write();
        let series = all.entry((channel, level)).or_default();
        for row in rows {
            series.insert(row.bucket_start(), row);
        }
        Ok(written)
    }

    fn clear(&self, level: Option<AggregationLevel>) -> Result<usize, StoreError> {
        let mut all = self.rows.write();
        let mut removed = 0;
        all.retain(|(_, row_level), series| {
            let matches = level.map_or(true, |level| level == *row_level);
            if matches {
                removed += series.len();
            }
            !matches
        });
        Ok(removed)
    }
}
