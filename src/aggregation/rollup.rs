//! Rollup maintenance
//!
//! Rolls raw samples up into one row per calendar bucket:
//! - Full mode: recompute every complete bucket (within the lookback)
//! - Delta mode: only buckets after the latest existing rollup row
//! - Lookback: `periods > 0` limits work to the last `periods` buckets, but
//!   never skips buckets between the latest row and the window
//!
//! Only complete buckets are written; the bucket containing `now` is still
//! receiving samples and is left to the raw tier. Scheduling and the CLI
//! wrapper live outside this crate, [`RollupAggregator::run`] is the body of
//! one periodic run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregation::{AggregationLevel, Reducer};
use crate::config::AggregationConfig;
use crate::engine::traits::{RollupWriter, SampleStore};
use crate::error::{Error, Result};
use crate::metrics;
use crate::query::operators::group_by_level;
use crate::types::{ChannelId, RollupRow, ScanRange, Tuple};

// ============================================================================
// Aggregation Mode
// ============================================================================

/// How much history a maintenance run recomputes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Recompute every complete bucket
    Full,
    /// Continue after the latest existing rollup row, the lookback only
    /// applies to a channel without rows
    #[default]
    Delta,
}

impl AggregationMode {
    /// Lowercase name
    pub fn name(self) -> &'static str {
        match self {
            AggregationMode::Full => "full",
            AggregationMode::Delta => "delta",
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(AggregationMode::Full),
            "delta" => Ok(AggregationMode::Delta),
            other => Err(Error::UnsupportedMode(other.to_string())),
        }
    }
}

// ============================================================================
// Rollup Aggregator
// ============================================================================

/// Writes rollup rows from raw samples
pub struct RollupAggregator<'a, S: ?Sized, W: ?Sized> {
    /// Raw sample store
    samples: &'a S,

    /// Rollup store
    writer: &'a W,

    /// Whether Prometheus collectors are updated
    metrics_enabled: bool,
}

impl<'a, S, W> RollupAggregator<'a, S, W>
where
    S: SampleStore + ?Sized,
    W: RollupWriter + ?Sized,
{
    /// Create an aggregator over the stores
    pub fn new(samples: &'a S, writer: &'a W) -> Self {
        Self {
            samples,
            writer,
            metrics_enabled: true,
        }
    }

    /// Enable or disable metric recording
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Sample range a run has to roll up for one channel
    ///
    /// `None` when there is nothing to do.
    pub fn pending_range(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        mode: AggregationMode,
        periods: u32,
        now: i64,
    ) -> Result<Option<ScanRange>> {
        let upper = level.truncate(now);
        let latest = self
            .writer
            .last_before(channel, level, None)?
            .map(|row| level.next_bucket(row.timestamp));
        let window = (periods > 0).then(|| level.offset(upper, -i64::from(periods)));

        // Rows must stay contiguous, so the window never starts after `latest`
        let lower = match (mode, latest) {
            (AggregationMode::Delta, Some(next)) => Some(next),
            (AggregationMode::Full, Some(next)) => window.map(|window| window.min(next)),
            (_, None) => window,
        };

        let range = ScanRange::half_open(lower, Some(upper));
        Ok((!range.is_empty()).then_some(range))
    }

    /// Roll up one channel at one level, returning the rows written
    pub fn aggregate_channel(
        &self,
        channel: ChannelId,
        level: AggregationLevel,
        reducer: Reducer,
        mode: AggregationMode,
        periods: u32,
        now: i64,
    ) -> Result<usize> {
        if !level.is_supported() {
            return Err(Error::UnsupportedLevel(level.name().to_string()));
        }

        let Some(range) = self.pending_range(channel, level, mode, periods, now)? else {
            debug!(channel, %level, "no complete bucket pending");
            return Ok(0);
        };

        let samples = self
            .samples
            .scan(channel, &range)?
            .map(|sample| sample.map(Tuple::from));
        let rows = group_by_level(samples, level, reducer)
            .map(|tuple| {
                tuple.map(|tuple| RollupRow {
                    channel_id: channel,
                    level,
                    timestamp: tuple.timestamp,
                    value: tuple.value,
                    count: tuple.count,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Ok(0);
        }

        let written = self.writer.replace_rows(channel, level, rows)?;
        if self.metrics_enabled {
            metrics::record_rollup_write(level.name(), written);
        }
        info!(
            channel,
            %level,
            %mode,
            range = %range,
            rows = written,
            "rollup rows written"
        );
        Ok(written)
    }

    /// Roll up several channels at one level
    pub fn aggregate<I>(
        &self,
        channels: I,
        level: AggregationLevel,
        mode: AggregationMode,
        periods: u32,
        now: i64,
    ) -> Result<usize>
    where
        I: IntoIterator<Item = (ChannelId, Reducer)>,
    {
        channels.into_iter().try_fold(0, |total, (channel, reducer)| {
            let written = self
                .aggregate_channel(channel, level, reducer, mode, periods, now)
                .map_err(|e| {
                    if self.metrics_enabled {
                        metrics::record_error(e.kind(), "rollup");
                    }
                    e
                })?;
            Ok(total + written)
        })
    }

    /// Remove rollup rows of one level, or of every level
    pub fn clear(&self, level: Option<AggregationLevel>) -> Result<usize> {
        let removed = self.writer.clear(level)?;
        info!(
            level = level.map_or("all", AggregationLevel::name),
            removed,
            "rollup rows cleared"
        );
        Ok(removed)
    }

    /// One maintenance run over every configured level
    pub fn run(
        &self,
        config: &AggregationConfig,
        channels: &[(ChannelId, Reducer)],
        now: i64,
    ) -> Result<usize> {
        let levels = config.levels()?;
        let mode = config.mode()?;

        let mut total = 0;
        for level in levels {
            total += self.aggregate(channels.iter().copied(), level, mode, config.periods, now)?;
        }
        info!(%mode, channels = channels.len(), rows = total, "rollup run finished");
        Ok(total)
    }
}
