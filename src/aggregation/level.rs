//! Aggregation levels and calendar bucket arithmetic
//!
//! Each level maps to a numeric rank (persisted alongside rollup rows, so the
//! order must never change) and a calendar truncation function. Buckets are
//! aligned in UTC.
//!
//! | level  | rank | bucket                 |
//! |--------|------|------------------------|
//! | second | 0    | `%Y-%m-%d %H:%M:%S`    |
//! | minute | 1    | `%Y-%m-%d %H:%M:00`    |
//! | hour   | 2    | `%Y-%m-%d %H:00:00`    |
//! | day    | 3    | `%Y-%m-%d`             |
//! | week   | 4    | not supported          |
//! | month  | 5    | `%Y-%m-01`             |
//! | year   | 6    | `%Y-01-01`             |

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const WEEK_MS: i64 = 7 * DAY_MS;

/// Calendar aggregation level
///
/// Variants are declared in rank order; a higher rank is a coarser bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationLevel {
    /// One bucket per second
    Second,
    /// One bucket per minute
    Minute,
    /// One bucket per hour
    Hour,
    /// One bucket per calendar day
    Day,
    /// Recognized, but has no bucket format
    Week,
    /// One bucket per calendar month
    Month,
    /// One bucket per calendar year
    Year,
}

impl AggregationLevel {
    /// All levels in rank order
    pub const ALL: [AggregationLevel; 7] = [
        AggregationLevel::Second,
        AggregationLevel::Minute,
        AggregationLevel::Hour,
        AggregationLevel::Day,
        AggregationLevel::Week,
        AggregationLevel::Month,
        AggregationLevel::Year,
    ];

    /// Numeric rank
    pub fn rank(self) -> u8 {
        match self {
            AggregationLevel::Second => 0,
            AggregationLevel::Minute => 1,
            AggregationLevel::Hour => 2,
            AggregationLevel::Day => 3,
            AggregationLevel::Week => 4,
            AggregationLevel::Month => 5,
            AggregationLevel::Year => 6,
        }
    }

    /// Level for a numeric rank
    pub fn from_rank(rank: u8) -> Option<Self> {
        Self::ALL.get(rank as usize).copied()
    }

    /// Lowercase level name
    pub fn name(self) -> &'static str {
        match self {
            AggregationLevel::Second => "second",
            AggregationLevel::Minute => "minute",
            AggregationLevel::Hour => "hour",
            AggregationLevel::Day => "day",
            AggregationLevel::Week => "week",
            AggregationLevel::Month => "month",
            AggregationLevel::Year => "year",
        }
    }

    /// Whether the level has an implemented bucket format
    pub fn is_supported(self) -> bool {
        self != AggregationLevel::Week
    }

    /// Parse a level name and require a bucket format
    ///
    /// Unknown names fail with [`Error::UnknownGrouping`], "week" with
    /// [`Error::UnsupportedLevel`].
    pub fn parse_supported(name: &str) -> Result<Self, Error> {
        let level: AggregationLevel = name.parse()?;
        if !level.is_supported() {
            return Err(Error::UnsupportedLevel(name.to_string()));
        }
        Ok(level)
    }

    /// Supported levels in rank order
    pub fn supported() -> impl Iterator<Item = AggregationLevel> {
        Self::ALL.into_iter().filter(|level| level.is_supported())
    }

    /// Start of the bucket containing `timestamp`
    ///
    /// Timestamps outside the calendar range chrono can represent are
    /// returned unchanged.
    pub fn truncate(self, timestamp: i64) -> i64 {
        match self {
            AggregationLevel::Second => floor_to(timestamp, SECOND_MS),
            AggregationLevel::Minute => floor_to(timestamp, MINUTE_MS),
            AggregationLevel::Hour => floor_to(timestamp, HOUR_MS),
            AggregationLevel::Day => floor_to(timestamp, DAY_MS),
            AggregationLevel::Week => {
                // 1970-01-01 was a Thursday, weeks start on Monday
                let day = floor_to(timestamp, DAY_MS);
                let weekday = (day.div_euclid(DAY_MS) + 3).rem_euclid(7);
                day - weekday * DAY_MS
            }
            AggregationLevel::Month => calendar_floor(timestamp, |date| {
                NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
            }),
            AggregationLevel::Year => {
                calendar_floor(timestamp, |date| NaiveDate::from_ymd_opt(date.year(), 1, 1))
            }
        }
    }

    /// Move a bucket start by `buckets` buckets (negative moves backwards)
    pub fn offset(self, bucket_start: i64, buckets: i64) -> i64 {
        let months = match self {
            AggregationLevel::Second => return shift(bucket_start, buckets, SECOND_MS),
            AggregationLevel::Minute => return shift(bucket_start, buckets, MINUTE_MS),
            AggregationLevel::Hour => return shift(bucket_start, buckets, HOUR_MS),
            AggregationLevel::Day => return shift(bucket_start, buckets, DAY_MS),
            AggregationLevel::Week => return shift(bucket_start, buckets, WEEK_MS),
            AggregationLevel::Month => buckets,
            AggregationLevel::Year => buckets.saturating_mul(12),
        };

        let saturated = if months >= 0 { i64::MAX } else { i64::MIN };
        let Some(start) = DateTime::<Utc>::from_timestamp_millis(bucket_start) else {
            return saturated;
        };
        let Ok(amount) = u32::try_from(months.unsigned_abs()) else {
            return saturated;
        };
        let moved = if months >= 0 {
            start.checked_add_months(Months::new(amount))
        } else {
            start.checked_sub_months(Months::new(amount))
        };
        moved.map_or(saturated, |dt| dt.timestamp_millis())
    }

    /// Start of the bucket following the one containing `timestamp`
    pub fn next_bucket(self, timestamp: i64) -> i64 {
        self.offset(self.truncate(timestamp), 1)
    }
}

impl fmt::Display for AggregationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregationLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.name() == s)
            .ok_or_else(|| Error::UnknownGrouping(s.to_string()))
    }
}

#[inline]
fn floor_to(timestamp: i64, width: i64) -> i64 {
    timestamp - timestamp.rem_euclid(width)
}

#[inline]
fn shift(bucket_start: i64, buckets: i64, width: i64) -> i64 {
    bucket_start.saturating_add(buckets.saturating_mul(width))
}

fn calendar_floor(timestamp: i64, floor: impl Fn(NaiveDate) -> Option<NaiveDate>) -> i64 {
    DateTime::<Utc>::from_timestamp_millis(timestamp)
        .and_then(|dt| floor(dt.date_naive()))
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map_or(timestamp, |start| start.and_utc().timestamp_millis())
}
