//! Configuration management for Equinox
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. Command line flags override the values
//! loaded here. The seasonal schedule lives in its own file (see
//! [`crate::schedule`]) because it is re-read on every iteration.

use crate::error::{EquinoxError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Modbus TCP connection configuration
    pub modbus: ModbusConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Register write retry policy
    pub writer: WriterConfig,

    /// Path to the seasonal schedule file
    pub schedule_file: String,

    /// Interval between iterations when running as a service, in seconds.
    /// The schedule's `update_interval` takes precedence when present.
    pub update_interval_secs: u64,
}

/// Modbus TCP connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    /// Host name or IP address of the inverter
    pub host: String,

    /// TCP port (SolarEdge uses 1502)
    pub port: u16,

    /// Modbus unit (slave) id
    pub unit: u8,

    /// Connection and per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file
    pub file: String,

    /// Number of rotated (daily) files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Retry policy for register writes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Attempts for retryable writes (including the first)
    pub max_attempts: u32,

    /// Delay between attempts in seconds
    pub retry_delay_secs: f64,
}

impl ModbusConfig {
    /// Timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl WriterConfig {
    /// Retry delay as a `Duration`
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs.max(0.0))
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "equinox_config.yaml",
            "/data/equinox_config.yaml",
            "/etc/equinox/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.modbus.host.is_empty() {
            return Err(EquinoxError::validation(
                "modbus.host",
                "Host cannot be empty",
            ));
        }

        if self.modbus.port == 0 {
            return Err(EquinoxError::validation(
                "modbus.port",
                "Port must be greater than 0",
            ));
        }

        if self.modbus.timeout_secs == 0 {
            return Err(EquinoxError::validation(
                "modbus.timeout_secs",
                "Must be greater than 0",
            ));
        }

        if self.writer.max_attempts == 0 {
            return Err(EquinoxError::validation(
                "writer.max_attempts",
                "Must be at least 1",
            ));
        }

        if !self.writer.retry_delay_secs.is_finite() || self.writer.retry_delay_secs < 0.0 {
            return Err(EquinoxError::validation(
                "writer.retry_delay_secs",
                "Must be a non-negative number",
            ));
        }

        if self.schedule_file.is_empty() {
            return Err(EquinoxError::validation(
                "schedule_file",
                "Path cannot be empty",
            ));
        }

        if self.update_interval_secs == 0 {
            return Err(EquinoxError::validation(
                "update_interval_secs",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}
