//! Query Planner - strategy selection and tier stitching
//!
//! This module turns a validated request plus the rollup store's answers
//! (row counts per level, resolved boundary) into an immutable [`QueryPlan`].
//! Every function here is pure; store access happens in the engine and
//! execution in the executor.
//!
//! # Strategies
//!
//! ```text
//!                       rollups eligible?
//!                      /                 \
//!                    no                   yes
//!                    |              level + valid boundary?
//!                    |             /                      \
//!                    |           no                        yes
//!                    |           |                  groupBy requested?
//!                    |           |                 /                  \
//!                    |           |               yes                   no
//!                    v           v                v                     v
//!                   Raw         Raw            Grouped               Counted (target set)
//! ```
//!
//! # Stitching
//!
//! ```text
//!  [from, rollup_from)        raw-pre       (samples, count 1)
//!  [rollup_from, rollup_to)   rollup-middle (rollup rows, own count)
//!  [rollup_to, to]            raw-post      (samples, count 1)
//! ```
//!
//! The three ranges partition `[from, to]`: no timestamp is served by two
//! tiers and none is skipped.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregation::{AggregationLevel, Reducer};
use crate::error::Result;
use crate::types::{AggregationBoundary, ChannelId, ClientHint, QueryRange, ScanRange};

// ============================================================================
// Query Request
// ============================================================================

/// A range query as issued by the caller
///
/// # Example
///
/// ```rust
/// use kuba_rollup::query::QueryRequest;
/// use kuba_rollup::types::ClientHint;
///
/// let request = QueryRequest::new(42)
///     .from(1_700_000_000_000)
///     .to(1_700_086_400_000)
///     .group_by("hour")
///     .client(ClientHint::Raw);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Channel to query
    pub channel: ChannelId,

    /// Start timestamp (inclusive), `None` = open start
    pub from: Option<i64>,

    /// End timestamp (inclusive), `None` = open end
    pub to: Option<i64>,

    /// Calendar grouping level name
    pub group_by: Option<String>,

    /// Target tuple count; `None` or `0` disables downsampling
    pub tuple_count: Option<u64>,

    /// Caller category
    pub client: ClientHint,

    /// Value reducer of the channel type
    pub reducer: Reducer,
}

impl QueryRequest {
    /// Unbounded, ungrouped request for a channel
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }

    /// Set the start timestamp
    pub fn from(mut self, from: i64) -> Self {
        self.from = Some(from);
        self
    }

    /// Set the end timestamp
    pub fn to(mut self, to: i64) -> Self {
        self.to = Some(to);
        self
    }

    /// Group by a calendar level
    pub fn group_by(mut self, level: impl Into<String>) -> Self {
        self.group_by = Some(level.into());
        self
    }

    /// Downsample to a target tuple count
    pub fn tuple_count(mut self, count: u64) -> Self {
        self.tuple_count = Some(count);
        self
    }

    /// Set the caller category
    pub fn client(mut self, client: ClientHint) -> Self {
        self.client = client;
        self
    }

    /// Set the value reducer
    pub fn reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    /// Check range and grouping before any store access
    pub fn validate(&self) -> Result<(QueryRange, Option<AggregationLevel>)> {
        let range = QueryRange::new(self.from, self.to)?;
        let group_by = self
            .group_by
            .as_deref()
            .map(AggregationLevel::parse_supported)
            .transpose()?;
        Ok((range, group_by))
    }
}

/// Requested tuple count after dropping `0` and applying the configured cap
pub fn effective_tuple_count(requested: Option<u64>, cap: Option<u64>) -> Option<u64> {
    let requested = requested.filter(|count| *count > 0)?;
    Some(cap.map_or(requested, |cap| requested.min(cap)))
}

// ============================================================================
// Plan Types
// ============================================================================

/// Execution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Raw samples only
    Raw,
    /// Stitched tiers re-grouped by calendar bucket
    Grouped,
    /// Stitched tiers downsampled by row ordinal to a tuple target
    Counted,
}

impl Strategy {
    /// Label used in logs and metrics
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Raw => "raw",
            Strategy::Grouped => "grouped",
            Strategy::Counted => "counted",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One scan of a stitched query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    /// Raw samples in the range
    Raw(ScanRange),
    /// Rollup rows of a level in the range
    Rollup {
        /// Aggregation level of the rows
        level: AggregationLevel,
        /// Range on the rows' (max) timestamps
        range: ScanRange,
    },
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Raw(range) => write!(f, "raw {}", range),
            Tier::Rollup { level, range } => write!(f, "rollup({}) {}", level, range),
        }
    }
}

/// Immutable plan consumed by the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Channel to query
    pub channel: ChannelId,

    /// Effective range (after widening for graphical clients)
    pub range: QueryRange,

    /// Execution strategy
    pub strategy: Strategy,

    /// Requested calendar grouping
    pub group_by: Option<AggregationLevel>,

    /// Rollup level the middle tier reads from
    pub rollup_level: Option<AggregationLevel>,

    /// Resolved rollup boundary (invalid for raw plans)
    pub boundary: AggregationBoundary,

    /// Scans in timestamp order
    pub tiers: Vec<Tier>,

    /// Target tuple count
    pub tuple_count: Option<u64>,

    /// Value reducer
    pub reducer: Reducer,
}

impl QueryPlan {
    /// Assemble the plan for a validated request
    ///
    /// `rollup` carries the chosen level and its resolved boundary when
    /// rollups were eligible; an invalid boundary falls back to [`Strategy::Raw`].
    pub fn build(
        channel: ChannelId,
        range: QueryRange,
        group_by: Option<AggregationLevel>,
        tuple_count: Option<u64>,
        reducer: Reducer,
        rollup: Option<(AggregationLevel, AggregationBoundary)>,
    ) -> Self {
        let stitched = rollup.filter(|(_, boundary)| boundary.is_valid());

        let (strategy, rollup_level, boundary, tiers) = match (group_by, stitched) {
            (Some(_), Some((level, boundary))) => (
                Strategy::Grouped,
                Some(level),
                boundary,
                stitch(&range, level, &boundary),
            ),
            (None, Some((level, boundary))) if tuple_count.is_some() => (
                Strategy::Counted,
                Some(level),
                boundary,
                stitch(&range, level, &boundary),
            ),
            _ => (
                Strategy::Raw,
                None,
                AggregationBoundary::none(),
                vec![Tier::Raw(range.scan())],
            ),
        };

        Self {
            channel,
            range,
            strategy,
            group_by,
            rollup_level,
            boundary,
            tiers,
            tuple_count,
            reducer,
        }
    }

    /// Whether any tier reads rollup rows
    pub fn uses_rollups(&self) -> bool {
        self.tiers
            .iter()
            .any(|tier| matches!(tier, Tier::Rollup { .. }))
    }

    /// Human-readable plan description
    pub fn explain(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "Query Plan: channel {} strategy {}\n",
            self.channel, self.strategy
        ));
        if let Some(level) = self.group_by {
            output.push_str(&format!("  Group by: {}\n", level));
        }
        if let Some(count) = self.tuple_count {
            output.push_str(&format!("  Target tuples: {}\n", count));
        }
        for tier in &self.tiers {
            output.push_str(&format!("  Tier: {}\n", tier));
        }
        output
    }
}

// ============================================================================
// Planning Functions
// ============================================================================

/// Pick the rollup level to read from
///
/// The coarsest supported level that has rows and is not coarser than the
/// grouping wins. Without rows the configured default is used if the grouping
/// allows it; `None` means no level qualifies.
pub fn choose_level(
    counts: &[(AggregationLevel, u64)],
    group_by: Option<AggregationLevel>,
    default_level: AggregationLevel,
) -> Option<AggregationLevel> {
    let allowed = |level: AggregationLevel| {
        level.is_supported() && group_by.map_or(true, |group_by| level <= group_by)
    };

    counts
        .iter()
        .filter(|(level, count)| *count > 0 && allowed(*level))
        .map(|(level, _)| *level)
        .max()
        .or_else(|| allowed(default_level).then_some(default_level))
}

/// Split a range into raw-pre, rollup-middle and raw-post tiers
///
/// Empty tiers are left out. An invalid boundary yields a single raw scan.
pub fn stitch(
    range: &QueryRange,
    level: AggregationLevel,
    boundary: &AggregationBoundary,
) -> Vec<Tier> {
    let Some((rollup_from, rollup_to)) = boundary.bounds() else {
        return vec![Tier::Raw(range.scan())];
    };

    if range.to.is_some_and(|to| to < rollup_from) {
        return vec![Tier::Raw(range.scan())];
    }

    let tiers = [
        Tier::Raw(ScanRange::half_open(range.from, Some(rollup_from))),
        Tier::Rollup {
            level,
            range: ScanRange::half_open(Some(rollup_from), Some(rollup_to)),
        },
        Tier::Raw(ScanRange::closed(Some(rollup_to), range.to)),
    ];

    tiers
        .into_iter()
        .filter(|tier| match tier {
            Tier::Raw(range) | Tier::Rollup { range, .. } => !range.is_empty(),
        })
        .collect()
}
