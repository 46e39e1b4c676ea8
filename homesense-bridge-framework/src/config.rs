//! Configuration traits and utilities.

use std::path::Path;

use serde::de::DeserializeOwned;

use homesense_common::{EnvSource, LoggingConfig, MqttConfig};

use crate::error::{BridgeError, Result};

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's configuration struct to get
/// loading from JSON5, environment overlays, and validation.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use homesense_bridge_framework::{BridgeConfig, LoggingConfig, MqttConfig};
///
/// #[derive(Debug, Default, Deserialize)]
/// pub struct MyBridgeConfig {
///     pub mqtt: MqttConfig,
///     pub logging: LoggingConfig,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn mqtt(&self) -> &MqttConfig {
///         &self.mqtt
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + Default + DeserializeOwned {
    /// Get the MQTT configuration.
    fn mqtt(&self) -> &MqttConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Overlay environment variables on top of the loaded values.
    fn apply_env(&mut self, env: &impl EnvSource) -> Result<()> {
        let _ = env;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation,
    /// calling [`validate_mqtt`](Self::validate_mqtt) as well.
    fn validate(&self) -> Result<()> {
        self.validate_mqtt()
    }

    /// Validate the MQTT connection settings.
    fn validate_mqtt(&self) -> Result<()> {
        self.mqtt()
            .validate()
            .map_err(|e| BridgeError::validation(e.to_string()))
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::load_unvalidated(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the effective configuration.
    ///
    /// Starts from the file at `path` (or defaults when `None`), applies the
    /// environment overlay, then validates.
    fn resolve(path: Option<&Path>, env: &impl EnvSource) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_unvalidated(path)?,
            None => Self::default(),
        };

        config.apply_env(env)?;
        config.validate()?;

        Ok(config)
    }

    #[doc(hidden)]
    fn load_unvalidated(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Ok(json5::from_str(&content)?)
    }
}
