//! Value reducers selected per channel type
//!
//! Counters and meters are summed; max-hold or min-hold sensors keep the
//! extreme. Every reducer is associative and commutative, so raw rows,
//! rollup rows and already reduced tuples can be re-reduced at any stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Reducer applied to the values of one group or package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    /// Sum of values
    #[default]
    Sum,
    /// Largest value
    Max,
    /// Smallest value
    Min,
}

impl Reducer {
    /// Combine two partial results
    #[inline]
    pub fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            Reducer::Sum => a + b,
            Reducer::Max => a.max(b),
            Reducer::Min => a.min(b),
        }
    }

    /// Reduce a sequence of values, `None` when empty
    pub fn reduce<I>(self, values: I) -> Option<f64>
    where
        I: IntoIterator<Item = f64>,
    {
        values.into_iter().reduce(|a, b| self.combine(a, b))
    }

    /// Lowercase name
    pub fn name(self) -> &'static str {
        match self {
            Reducer::Sum => "sum",
            Reducer::Max => "max",
            Reducer::Min => "min",
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Reducer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(Reducer::Sum),
            "max" => Ok(Reducer::Max),
            "min" => Ok(Reducer::Min),
            other => Err(Error::Configuration(format!("unknown reducer '{}'", other))),
        }
    }
}
