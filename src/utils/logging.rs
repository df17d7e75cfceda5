//! Structured logging setup backed by `tracing-subscriber`.
//!
//! Honors the `LoggingConfig` section: level, console/file outputs, and
//! optional JSON formatting for log aggregation.

use crate::config::LoggingConfig;
use crate::error::{Result, WireError};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize global logging from configuration.
///
/// Call once at startup; a second call fails because the global subscriber
/// is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if let (true, Some(path)) = (config.log_to_file, config.log_file_path.as_ref()) {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| WireError::ConfigError(format!("Failed to open log file: {e}")))?;
        let writer = std::sync::Arc::new(file);

        if config.json_format {
            builder.json().with_writer(writer).try_init()
        } else {
            builder.with_ansi(false).with_writer(writer).try_init()
        }
    } else if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| WireError::ConfigError(format!("Failed to install subscriber: {e}")))?;

    info!(app = %config.app_name, "Logging initialized");
    Ok(())
}
