//! Core data types shared by the stores, the planner and the operators
//!
//! # Key Types
//!
//! - **`Sample`**: a raw measurement (timestamp + value), immutable once written
//! - **`RollupRow`**: the reduction of all samples of one calendar bucket
//! - **`Tuple`**: the uniform result unit (timestamp, value, count)
//! - **`QueryRange`**: requested window, both ends optional
//! - **`ScanRange`**: a concrete store scan window with explicit end bound
//! - **`AggregationBoundary`**: the sub-range served from the rollup store
//!
//! # Example
//!
//! ```rust
//! use kuba_rollup::types::{QueryRange, ScanRange, Tuple};
//!
//! let range = QueryRange::new(Some(1000), Some(2000)).unwrap();
//! assert!(QueryRange::new(Some(2000), Some(1000)).is_err());
//!
//! let scan = ScanRange::half_open(range.from, Some(1500));
//! assert!(scan.contains(1000));
//! assert!(!scan.contains(1500));
//!
//! let tuple = Tuple::new(1200, 4.0, 1);
//! assert_eq!(tuple.count, 1);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::aggregation::{AggregationLevel, Reducer};
use crate::error::Error;

/// Identifier of a channel (one time-series)
pub type ChannelId = u64;

/// A raw measurement
///
/// `timestamp` is in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Measured value
    pub value: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Pre-aggregated row covering one calendar bucket at one level
///
/// `timestamp` is the *maximum* timestamp among the constituent samples,
/// not the bucket start, so rollup rows sort together with raw rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollupRow {
    /// Channel the row belongs to
    pub channel_id: ChannelId,
    /// Aggregation level of the bucket
    pub level: AggregationLevel,
    /// Max timestamp of the constituent samples
    pub timestamp: i64,
    /// Reduced value of the constituent samples
    pub value: f64,
    /// Number of constituent samples
    pub count: u64,
}

impl RollupRow {
    /// Start of the calendar bucket this row covers
    pub fn bucket_start(&self) -> i64 {
        self.level.truncate(self.timestamp)
    }
}

/// Result unit flowing through raw rows, rollup rows and reduced rows alike
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    /// Max timestamp of the represented samples
    pub timestamp: i64,
    /// Reduced value
    pub value: f64,
    /// Number of represented samples
    pub count: u64,
}

impl Tuple {
    /// Create a new tuple
    pub fn new(timestamp: i64, value: f64, count: u64) -> Self {
        Self {
            timestamp,
            value,
            count,
        }
    }

    /// Fold another tuple into this one
    ///
    /// Max timestamp, reduced value, summed count. Associative and
    /// order-independent for every [`Reducer`].
    pub fn merge(&mut self, other: &Tuple, reducer: Reducer) {
        self.timestamp = self.timestamp.max(other.timestamp);
        self.value = reducer.combine(self.value, other.value);
        self.count += other.count;
    }
}

impl From<Sample> for Tuple {
    fn from(sample: Sample) -> Self {
        Self::new(sample.timestamp, sample.value, 1)
    }
}

impl From<RollupRow> for Tuple {
    fn from(row: RollupRow) -> Self {
        Self::new(row.timestamp, row.value, row.count)
    }
}

/// Requested query window
///
/// `from == None` is an open start, `to == None` an open end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryRange {
    /// Start timestamp (inclusive)
    pub from: Option<i64>,
    /// End timestamp (inclusive)
    pub to: Option<i64>,
}

impl QueryRange {
    /// Create a range, rejecting `from > to`
    pub fn new(from: Option<i64>, to: Option<i64>) -> Result<Self, Error> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(Error::InvalidRange { from, to });
            }
        }
        Ok(Self { from, to })
    }

    /// Unbounded range
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// The store scan covering the whole range (end inclusive)
    pub fn scan(&self) -> ScanRange {
        ScanRange::closed(self.from, self.to)
    }
}

/// Concrete scan window handed to a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRange {
    /// Start timestamp (inclusive), `None` = unbounded
    pub from: Option<i64>,
    /// End timestamp, `None` = unbounded
    pub to: Option<i64>,
    /// Whether `to` itself is part of the range
    pub to_inclusive: bool,
}

impl ScanRange {
    /// `[from, to]`
    pub fn closed(from: Option<i64>, to: Option<i64>) -> Self {
        Self {
            from,
            to,
            to_inclusive: true,
        }
    }

    /// `[from, to)`
    pub fn half_open(from: Option<i64>, to: Option<i64>) -> Self {
        Self {
            from,
            to,
            to_inclusive: false,
        }
    }

    /// Check whether a timestamp falls inside the range
    #[inline]
    pub fn contains(&self, timestamp: i64) -> bool {
        let after_start = self.from.map_or(true, |from| timestamp >= from);
        let before_end = match self.to {
            None => true,
            Some(to) if self.to_inclusive => timestamp <= to,
            Some(to) => timestamp < to,
        };
        after_start && before_end
    }

    /// True when no timestamp can satisfy the range
    pub fn is_empty(&self) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) if self.to_inclusive => from > to,
            (Some(from), Some(to)) => from >= to,
            _ => false,
        }
    }
}

impl fmt::Display for ScanRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let close = if self.to_inclusive { ']' } else { ')' };
        match (self.from, self.to) {
            (Some(from), Some(to)) => write!(f, "[{}, {}{}", from, to, close),
            (Some(from), None) => write!(f, "[{}, ..)", from),
            (None, Some(to)) => write!(f, "(.., {}{}", to, close),
            (None, None) => write!(f, "(.., ..)"),
        }
    }
}

/// Sub-range of a query within which the rollup store has contiguous coverage
///
/// ```text
///     tier:   --raw-- -----rollup----- --raw--
/// timestamp:  from ... rollup_from ... rollup_to ... to
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregationBoundary {
    /// Start of the first fully covered bucket
    pub rollup_from: Option<i64>,
    /// Start of the first bucket not covered by a rollup row
    pub rollup_to: Option<i64>,
}

impl AggregationBoundary {
    /// Boundary for a store without relevant rollup rows
    pub fn none() -> Self {
        Self::default()
    }

    /// Both ends resolved to a timestamp
    pub fn is_valid(&self) -> bool {
        self.rollup_from.is_some() && self.rollup_to.is_some()
    }

    /// Both ends, when valid
    pub fn bounds(&self) -> Option<(i64, i64)> {
        Some((self.rollup_from?, self.rollup_to?))
    }
}

/// Caller category used for client specific optimizations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientHint {
    /// Graphical client: the range is widened by one sample on each side
    #[default]
    Normal,
    /// Raw client: exact range, no widening
    Raw,
    /// Bypass the rollup store entirely
    ForceSlow,
}

impl FromStr for ClientHint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(ClientHint::Raw),
            "slow" | "forceslow" | "force_slow" => Ok(ClientHint::ForceSlow),
            _ => Ok(ClientHint::Normal),
        }
    }
}
