use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// MQTT broker connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname or IP address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Broker port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Client identifier. Generated from the bridge name when unset.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Username for broker authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for broker authentication.
    #[serde(default)]
    pub password: Option<String>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Capacity of the client request channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Topic for retained bridge status messages (disabled when unset).
    #[serde(default)]
    pub status_topic: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_channel_capacity() -> usize {
    100
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: None,
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
            channel_capacity: default_channel_capacity(),
            status_topic: None,
        }
    }
}

impl MqttConfig {
    /// Overlay the `MQTT_*` environment variables.
    pub fn apply_env(&mut self, env: &impl EnvSource) -> Result<()> {
        if let Some(host) = env.var("MQTT_ADDRESS") {
            self.host = host;
        }
        if let Some(port) = env_parse(env, "MQTT_PORT")? {
            self.port = port;
        }
        if let Some(user) = env.var("MQTT_USER") {
            self.username = Some(user);
        }
        if let Some(password) = env.var("MQTT_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(client_id) = env.var("MQTT_CLIENT_ID") {
            self.client_id = Some(client_id);
        }
        Ok(())
    }

    /// Validate the connection settings.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("MQTT host cannot be empty".to_string()));
        }

        if let Some(id) = &self.client_id {
            if id.is_empty() || id.starts_with(' ') {
                return Err(Error::Config(format!("Invalid MQTT client id '{}'", id)));
            }
        }

        if self.keep_alive_secs < 5 {
            return Err(Error::Config(
                "MQTT keep_alive_secs must be at least 5".to_string(),
            ));
        }

        if self.channel_capacity == 0 {
            return Err(Error::Config(
                "MQTT channel_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Client identifier to use, falling back to `{bridge}-{pid}`.
    pub fn resolved_client_id(&self, bridge: &str) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("homesense-{}-{}", bridge, std::process::id()))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Source of environment variables.
///
/// Abstracted so configuration overlays can be tested without touching the
/// process environment.
pub trait EnvSource {
    /// Look up a variable, `None` when unset.
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Look up and parse an environment variable.
pub fn env_parse<T>(env: &impl EnvSource, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env.var(key) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| Error::Env {
            key: key.to_string(),
            message: format!("'{}': {}", raw, e),
        }),
        None => Ok(None),
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    json5::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}
