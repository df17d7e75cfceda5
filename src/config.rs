//! # Configuration Management
//!
//! Centralized configuration for the wire layer.
//!
//! This module provides structured configuration for circuits, including
//! retransmission cadence, ack coalescing, dedup-window sizing, datagram
//! limits, and logging options.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides
//!
//! ## Security Considerations
//! - Default expansion limit bounds decompression-bomb risk from hostile peers
//! - Dedup-window capacity bounds per-circuit memory under sequence-number floods

use crate::error::{Result, WireError};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Largest datagram this layer will emit or accept (bytes).
pub const MAX_DATAGRAM_SIZE: usize = 1200;

/// Upper bound on a zero-expanded message body (bytes).
pub const MAX_EXPANDED_SIZE: usize = 8 * 1024;

/// Main wire configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct WireConfig {
    /// Per-circuit reliability configuration
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// Datagram and body-transform configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WireConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| WireError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| WireError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| WireError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Start with defaults
        let mut config = Self::default();

        // Override with environment variables
        if let Ok(interval) = std::env::var("GRIDWIRE_RETRANSMIT_INTERVAL_MS") {
            if let Ok(val) = interval.parse::<u64>() {
                config.circuit.retransmit_interval = Duration::from_millis(val);
            }
        }

        if let Ok(retries) = std::env::var("GRIDWIRE_MAX_RETRIES") {
            if let Ok(val) = retries.parse::<u32>() {
                config.circuit.max_retries = val;
            }
        }

        if let Ok(window) = std::env::var("GRIDWIRE_ACK_COALESCE_MS") {
            if let Ok(val) = window.parse::<u64>() {
                config.circuit.ack_coalesce_window = Duration::from_millis(val);
            }
        }

        if let Ok(size) = std::env::var("GRIDWIRE_MAX_DATAGRAM_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.transport.max_datagram_size = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| WireError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| WireError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.circuit.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(WireError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Per-circuit reliability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitConfig {
    /// Interval between retransmission sweeps
    #[serde(with = "duration_serde")]
    pub retransmit_interval: Duration,

    /// Retries before a reliable send is reported as timed out
    pub max_retries: u32,

    /// How long queued acks wait for piggybacking before a dedicated flush
    #[serde(with = "duration_serde")]
    pub ack_coalesce_window: Duration,

    /// Maximum number of inbound sequence numbers remembered for dedup
    pub dedup_capacity: usize,

    /// Wall-clock age after which dedup entries expire
    #[serde(with = "duration_serde")]
    pub dedup_horizon: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            retransmit_interval: timeout::RETRANSMIT_INTERVAL,
            max_retries: 3,
            ack_coalesce_window: timeout::ACK_COALESCE_WINDOW,
            dedup_capacity: 1024,
            dedup_horizon: timeout::DEDUP_HORIZON,
        }
    }
}

impl CircuitConfig {
    /// Validate circuit configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.retransmit_interval.as_millis() < 10 {
            errors.push("Retransmit interval too short (minimum: 10ms)".to_string());
        } else if self.retransmit_interval.as_secs() > 60 {
            errors.push("Retransmit interval too long (maximum: 60s)".to_string());
        }

        if self.max_retries == 0 {
            errors.push("Max retries must be greater than 0".to_string());
        } else if self.max_retries > 100 {
            errors.push(format!(
                "Max retries very high: {} (each retry holds the full payload in memory)",
                self.max_retries
            ));
        }

        if self.ack_coalesce_window.as_millis() < 1 {
            errors.push("Ack coalesce window too short (minimum: 1ms)".to_string());
        } else if self.ack_coalesce_window.as_secs() > 5 {
            errors.push("Ack coalesce window too long (maximum: 5s)".to_string());
        }

        if self.dedup_capacity == 0 {
            errors.push("Dedup capacity must be greater than 0".to_string());
        } else if self.dedup_capacity > 1_000_000 {
            errors.push(format!(
                "Dedup capacity too large: {} (max recommended: 1,000,000)",
                self.dedup_capacity
            ));
        }

        if self.dedup_horizon.as_secs() < 1 {
            errors.push("Dedup horizon too short (minimum: 1s)".to_string());
        } else if self.dedup_horizon.as_secs() > 600 {
            errors.push("Dedup horizon too long (maximum: 10 minutes)".to_string());
        }

        errors
    }
}

/// Datagram and body-transform configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Largest datagram emitted or accepted
    pub max_datagram_size: usize,

    /// Upper bound on a zero-expanded message body
    pub max_expanded_size: usize,

    /// Whether outbound bodies are considered for zero-run coding
    pub zerocode_enabled: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: MAX_DATAGRAM_SIZE,
            max_expanded_size: MAX_EXPANDED_SIZE,
            zerocode_enabled: true,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_datagram_size < 64 {
            errors.push("Max datagram size too small (minimum: 64 bytes)".to_string());
        } else if self.max_datagram_size > 65_507 {
            errors.push(format!(
                "Max datagram size exceeds the UDP payload limit: {} bytes",
                self.max_datagram_size
            ));
        }

        if self.max_expanded_size < self.max_datagram_size {
            errors.push(
                "Max expanded size cannot be smaller than max datagram size".to_string(),
            );
        } else if self.max_expanded_size > 16 * 1024 * 1024 {
            errors.push(format!(
                "Max expanded size too large: {} bytes (maximum recommended: 16 MB)",
                self.max_expanded_size
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("gridwire"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
