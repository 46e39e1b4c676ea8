//! homesense Bridge Framework
//!
//! Common abstractions for building bridges that talk to an MQTT broker.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading, environment overlays and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`Publisher`] and [`MessagePublisher`] for publishing to the broker
//! - [`BridgeArgs`] for common CLI argument parsing
//! - [`BridgeStatus`] for retained status reporting (also registered as the MQTT Last Will)
//!
//! # Example
//!
//! ```ignore
//! use homesense_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner, ProcessEnv};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse();
//!     let config = MyBridgeConfig::resolve(args.config.as_deref(), &ProcessEnv)?;
//!
//!     let mut runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
//!
//!     // Spawn bridge-specific workers
//!     runner.spawn_eventloop_driver();
//!
//!     // Run until Ctrl+C or a worker fails
//!     runner.run().await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod error;
mod publisher;
mod runner;
mod status;

pub use args::BridgeArgs;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use publisher::{MessagePublisher, Publisher};
pub use runner::{BridgeRunner, drive_eventloop, run_bridge};
pub use status::{BridgeState, BridgeStatus, StatusPublisher};

// Re-export commonly used types from homesense-common
pub use homesense_common::{EnvSource, LogFormat, LoggingConfig, MqttConfig, ProcessEnv};
