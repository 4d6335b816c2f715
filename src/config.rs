//! Configuration for the telemetry engine
//!
//! All values carry defaults; invalid values (zero intervals, zero limits)
//! are silently replaced by their defaults during normalization so that a
//! bad configuration can never disable the engine.

use crate::entry::LogLevel;
use crate::observability::LogFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// Root directory for all category log directories
    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,
    /// Minimum level accepted by the engine; less severe calls are no-ops
    #[serde(default = "default_min_level")]
    pub min_level: LogLevel,
    /// Console output format for the binary's diagnostic subscriber
    #[serde(default = "default_format")]
    pub format: LogFormat,
    /// Maximum size in bytes before a log file is archived
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Maximum number of files retained per category directory
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Number of buffered entries that triggers an inline flush
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Periodic flush interval in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Rotation (and correlation sweep) interval in milliseconds
    #[serde(default = "default_rotation_interval_ms")]
    pub rotation_interval_ms: u64,
    /// Time-to-live for unresolved correlation records in milliseconds
    #[serde(default = "default_correlation_ttl_ms")]
    pub correlation_ttl_ms: u64,
    /// Capacity of the notification broadcast channel
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

fn default_log_root() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_min_level() -> LogLevel {
    LogLevel::Info
}

fn default_format() -> LogFormat {
    LogFormat::Json
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10 MiB
}

fn default_max_files() -> usize {
    5
}

fn default_buffer_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    5_000
}

fn default_rotation_interval_ms() -> u64 {
    3_600_000 // hourly
}

fn default_correlation_ttl_ms() -> u64 {
    3_600_000
}

fn default_notification_capacity() -> usize {
    256
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_root: default_log_root(),
            min_level: default_min_level(),
            format: default_format(),
            max_file_size: default_max_file_size(),
            max_files: default_max_files(),
            buffer_size: default_buffer_size(),
            flush_interval_ms: default_flush_interval_ms(),
            rotation_interval_ms: default_rotation_interval_ms(),
            correlation_ttl_ms: default_correlation_ttl_ms(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl TelemetryConfig {
    /// Load configuration from a TOML file and normalize invalid values
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: TelemetryConfig = toml::from_str(&content)?;
        config.normalize();
        Ok(config)
    }

    /// Replace values that would stall or disable the engine with defaults
    pub fn normalize(&mut self) {
        if self.max_file_size == 0 {
            self.max_file_size = default_max_file_size();
        }
        if self.max_files == 0 {
            self.max_files = default_max_files();
        }
        if self.buffer_size == 0 {
            self.buffer_size = default_buffer_size();
        }
        if self.flush_interval_ms == 0 {
            self.flush_interval_ms = default_flush_interval_ms();
        }
        if self.rotation_interval_ms == 0 {
            self.rotation_interval_ms = default_rotation_interval_ms();
        }
        if self.correlation_ttl_ms == 0 {
            self.correlation_ttl_ms = default_correlation_ttl_ms();
        }
        if self.notification_capacity == 0 {
            self.notification_capacity = default_notification_capacity();
        }
    }
}
