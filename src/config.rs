//! Configuration management for the rollup query engine
//!
//! This module provides configuration file support with TOML format,
//! environment variable overrides, and sensible defaults.
//!
//! ```toml
//! [aggregation]
//! enabled = true
//! default_level = "day"
//! levels = ["hour", "day"]
//! mode = "delta"
//! periods = 2
//!
//! [query]
//! max_tuple_count = 5000
//!
//! [monitoring]
//! log_level = "info"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregation::{AggregationLevel, AggregationMode};
use crate::engine::traits::AggregationSwitch;
use crate::error::{Error, Result, ValidationError};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Rollup usage and maintenance
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Query limits
    #[serde(default)]
    pub query: QueryConfig,

    /// Monitoring and observability
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Rollup configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AggregationConfig {
    /// Whether queries may read rollup rows
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Level used when no level has rollup rows yet
    #[serde(default = "default_level")]
    pub default_level: String,

    /// Levels maintained by the rollup job
    #[serde(default = "default_levels")]
    pub levels: Vec<String>,

    /// Maintenance mode: "full" or "delta"
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Lookback in buckets for the maintenance job (0 = unbounded)
    #[serde(default)]
    pub periods: u32,
}

/// Query configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Upper bound applied to requested tuple counts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tuple_count: Option<u64>,
}

/// Monitoring configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_true() -> bool { true }
fn default_level() -> String { "day".to_string() }
fn default_levels() -> Vec<String> { vec![default_level()] }
fn default_mode() -> String { "delta".to_string() }
fn default_log_level() -> String { "info".to_string() }

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_level: default_level(),
            levels: default_levels(),
            mode: default_mode(),
            periods: 0,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            log_level: default_log_level(),
        }
    }
}

impl AggregationConfig {
    /// Parsed fallback level
    pub fn default_level(&self) -> Result<AggregationLevel> {
        AggregationLevel::parse_supported(&self.default_level)
    }

    /// Parsed maintained levels, in configured order
    pub fn levels(&self) -> Result<Vec<AggregationLevel>> {
        self.levels
            .iter()
            .map(|name| AggregationLevel::parse_supported(name))
            .collect()
    }

    /// Parsed maintenance mode
    pub fn mode(&self) -> Result<AggregationMode> {
        self.mode.parse()
    }
}

impl AggregationSwitch for AggregationConfig {
    fn is_aggregation_enabled(&self) -> bool {
        self.enabled
    }
}

impl AggregationSwitch for Config {
    fn is_aggregation_enabled(&self) -> bool {
        self.aggregation.enabled
    }
}

impl MonitoringConfig {
    /// Install the global `tracing` subscriber
    ///
    /// `RUST_LOG` wins over the configured level. Does nothing when a
    /// subscriber is already installed.
    pub fn init_logging(&self) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.log_level));

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .try_init();

        if installed.is_ok() {
            tracing::debug!(log_level = %self.log_level, "logging initialized");
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // Aggregation
        if let Ok(enabled) = std::env::var("KUBA_AGGREGATION") {
            match enabled.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.aggregation.enabled = true,
                "0" | "false" | "off" | "no" => self.aggregation.enabled = false,
                other => tracing::warn!(value = other, "ignoring invalid KUBA_AGGREGATION"),
            }
        }
        if let Ok(level) = std::env::var("KUBA_AGGREGATION_LEVEL") {
            self.aggregation.default_level = level;
        }

        // Query
        if let Ok(max_tuples) = std::env::var("KUBA_MAX_TUPLES") {
            if let Ok(n) = max_tuples.parse() {
                self.query.max_tuple_count = Some(n);
            }
        }

        // Monitoring
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.aggregation.default_level().map_err(|e| ValidationError::InvalidFormat {
            field: "aggregation.default_level".to_string(),
            message: e.to_string(),
        })?;

        if self.aggregation.levels.is_empty() {
            return Err(ValidationError::InvalidFormat {
                field: "aggregation.levels".to_string(),
                message: "at least one level is required".to_string(),
            }
            .into());
        }
        self.aggregation.levels().map_err(|e| ValidationError::InvalidFormat {
            field: "aggregation.levels".to_string(),
            message: e.to_string(),
        })?;

        self.aggregation.mode().map_err(|e| ValidationError::InvalidFormat {
            field: "aggregation.mode".to_string(),
            message: e.to_string(),
        })?;

        if self.query.max_tuple_count == Some(0) {
            return Err(ValidationError::OutOfRange {
                field: "query.max_tuple_count".to_string(),
                value: "0".to_string(),
                min: "1".to_string(),
                max: u64::MAX.to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents).map_err(|e| {
            Error::Configuration(format!("Failed to write config file {}: {}", path.display(), e))
        })
    }
}
