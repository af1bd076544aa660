//! Error types for query planning, rollup maintenance and the store collaborators

use thiserror::Error;

use crate::types::ChannelId;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// `from` is larger than `to`
    #[error("Invalid range: from {from} is larger than to {to}")]
    InvalidRange {
        /// Requested start timestamp
        from: i64,
        /// Requested end timestamp
        to: i64,
    },

    /// Grouping is not one of the recognized aggregation levels
    #[error("Unknown grouping: {0}")]
    UnknownGrouping(String),

    /// Level is recognized but has no bucket format (e.g. "week")
    #[error("Unsupported aggregation level: {0}")]
    UnsupportedLevel(String),

    /// Rollup maintenance mode is not `full` or `delta`
    #[error("Unsupported aggregation mode: {0}")]
    UnsupportedMode(String),

    /// Failure reported by the sample or rollup store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidRange { .. } => "invalid_range",
            Error::UnknownGrouping(_) => "unknown_grouping",
            Error::UnsupportedLevel(_) => "unsupported_level",
            Error::UnsupportedMode(_) => "unsupported_mode",
            Error::Store(_) => "store",
            Error::Configuration(_) => "configuration",
        }
    }

    /// Whether the request was rejected before touching any store
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidRange { .. } | Error::UnknownGrouping(_) | Error::UnsupportedLevel(_)
        )
    }
}

/// Errors raised by the sample and rollup store collaborators
///
/// The planner never retries; these propagate unchanged inside [`Error::Store`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Store did not answer in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Channel is unknown to the store
    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    /// Backend specific failure
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Validation errors
///
/// Error type for configuration validation
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Value is out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Field name being validated
        field: String,
        /// The invalid value
        value: String,
        /// Minimum allowed value
        min: String,
        /// Maximum allowed value
        max: String,
    },

    /// Invalid format
    #[error("Invalid format for {field}: {message}")]
    InvalidFormat {
        /// Field name being validated
        field: String,
        /// Description of the format error
        message: String,
    },
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Configuration(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidRange { from: 20, to: 10 };
        assert_eq!(err.to_string(), "Invalid range: from 20 is larger than to 10");
        assert!(err.is_validation());
    }

    #[test]
    fn test_store_error_propagates() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "disk stalled");
        let err: Error = StoreError::from(io).into();
        assert_eq!(err.kind(), "store");
        assert!(!err.is_validation());
        assert!(err.to_string().contains("disk stalled"));
    }

    #[test]
    fn test_validation_error_into_configuration() {
        let err: Error = ValidationError::InvalidFormat {
            field: "aggregation.mode".to_string(),
            message: "expected full or delta".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
