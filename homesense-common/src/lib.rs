//! homesense Common Library
//!
//! This crate provides shared types and utilities for the homesense MQTT bridges:
//!
//! - [`reading`] - The `Reading` record produced by topic routing
//! - [`ignore`] - Comma-separated device/measurement ignore lists
//! - [`config`] - MQTT and logging configuration, JSON5 loading, environment overlays
//! - [`mqtt`] - MQTT client construction
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod ignore;
pub mod mqtt;
pub mod reading;

// Re-export commonly used types at the crate root
pub use config::{
    EnvSource, LogFormat, LoggingConfig, MqttConfig, ProcessEnv, env_parse, load_config,
    parse_config,
};
pub use error::{Error, Result};
pub use ignore::IgnoreSet;
pub use mqtt::{connect, mqtt_options};
pub use reading::Reading;

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
