//! InfluxDB bridge configuration.

use std::time::Duration;

use homesense_bridge_framework::{
    BridgeConfig, BridgeError, EnvSource, LoggingConfig, MqttConfig, Result,
};
use homesense_common::{IgnoreSet, env_parse};
use serde::{Deserialize, Serialize};

use crate::router::RoutePattern;

/// Complete InfluxDB bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfluxBridgeConfig {
    /// MQTT broker connection settings.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// InfluxDB connection settings.
    #[serde(default)]
    pub influxdb: InfluxDbConfig,

    /// Topic subscription and routing settings.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// InfluxDB 1.x HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxDbConfig {
    /// Server hostname or IP address.
    #[serde(default = "default_influx_host")]
    pub host: String,

    /// HTTP API port.
    #[serde(default = "default_influx_port")]
    pub port: u16,

    /// Use HTTPS instead of HTTP.
    #[serde(default)]
    pub https: bool,

    /// Username for basic authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for basic authentication.
    #[serde(default)]
    pub password: Option<String>,

    /// Target database.
    #[serde(default)]
    pub database: String,

    /// Create the database at startup when it does not exist.
    #[serde(default = "default_true")]
    pub create_database: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_influx_host() -> String {
    "localhost".to_string()
}

fn default_influx_port() -> u16 {
    8086
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for InfluxDbConfig {
    fn default() -> Self {
        Self {
            host: default_influx_host(),
            port: default_influx_port(),
            https: false,
            username: None,
            password: None,
            database: String::new(),
            create_database: default_true(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl InfluxDbConfig {
    /// Base URL of the HTTP API, e.g. `http://localhost:8086`.
    pub fn base_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// What to do with a routed message whose payload is not a number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseErrorPolicy {
    /// Log a warning and drop the message.
    #[default]
    Skip,
    /// Stop the bridge with an error.
    Stop,
}

/// Subscription and routing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// MQTT topic filter to subscribe to, e.g. `home/+/+`.
    #[serde(default)]
    pub topic: String,

    /// Regular expression with two capture groups: device and measurement.
    #[serde(default)]
    pub pattern: String,

    /// Device names to drop, written as a comma-separated string.
    #[serde(default)]
    pub ignore_devices: IgnoreSet,

    /// Measurement names to drop, written as a comma-separated string.
    #[serde(default)]
    pub ignore_measurements: IgnoreSet,

    /// Handling of non-numeric payloads.
    #[serde(default)]
    pub on_parse_error: ParseErrorPolicy,
}

impl InfluxBridgeConfig {
    /// Validate the bridge-specific settings.
    pub fn validate_config(&self) -> anyhow::Result<()> {
        if self.routing.topic.is_empty() {
            anyhow::bail!("routing.topic must be set (or MQTT_TOPIC)");
        }

        if self.routing.pattern.is_empty() {
            anyhow::bail!("routing.pattern must be set (or MQTT_REGEX)");
        }
        RoutePattern::new(&self.routing.pattern)?;

        if self.influxdb.host.is_empty() {
            anyhow::bail!("influxdb.host cannot be empty");
        }

        if self.influxdb.database.is_empty() {
            anyhow::bail!("influxdb.database must be set (or INFLUXDB_DATABASE)");
        }

        if self.influxdb.timeout_secs == 0 {
            anyhow::bail!("influxdb.timeout_secs must be greater than 0");
        }

        Ok(())
    }
}

impl BridgeConfig for InfluxBridgeConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn apply_env(&mut self, env: &impl EnvSource) -> Result<()> {
        self.mqtt.apply_env(env)?;

        if let Some(topic) = env.var("MQTT_TOPIC") {
            self.routing.topic = topic;
        }
        if let Some(pattern) = env.var("MQTT_REGEX") {
            self.routing.pattern = pattern;
        }
        if let Some(devices) = env.var("MQTT_IGNORE_DEVICES") {
            self.routing.ignore_devices = IgnoreSet::from_config(&devices);
        }
        if let Some(measurements) = env.var("MQTT_IGNORE_MEASUREMENTS") {
            self.routing.ignore_measurements = IgnoreSet::from_config(&measurements);
        }

        if let Some(host) = env.var("INFLUXDB_ADDRESS") {
            self.influxdb.host = host;
        }
        if let Some(port) = env_parse(env, "INFLUXDB_PORT")? {
            self.influxdb.port = port;
        }
        if let Some(user) = env.var("INFLUXDB_USER") {
            self.influxdb.username = Some(user);
        }
        if let Some(password) = env.var("INFLUXDB_PASSWORD") {
            self.influxdb.password = Some(password);
        }
        if let Some(database) = env.var("INFLUXDB_DATABASE") {
            self.influxdb.database = database;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.validate_mqtt()?;
        self.validate_config()
            .map_err(|e| BridgeError::validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            mqtt: {
                host: "broker.lan",
                client_id: "influx-bridge",
                status_topic: "homesense/bridges/influxdb"
            },
            influxdb: {
                host: "influx.lan",
                port: 8087,
                username: "writer",
                password: "secret",
                database: "home",
                create_database: false,
                timeout_secs: 5
            },
            routing: {
                topic: "home/+/+",
                pattern: "^home/([^/]+)/([^/]+)$",
                ignore_devices: "garage",
                ignore_measurements: "status",
                on_parse_error: "stop"
            },
            logging: {
                level: "debug"
            }
        }"#;

        let config: InfluxBridgeConfig = json5::from_str(json).unwrap();
        assert_eq!(config.mqtt.host, "broker.lan");
        assert_eq!(config.influxdb.port, 8087);
        assert_eq!(config.influxdb.username.as_deref(), Some("writer"));
        assert!(!config.influxdb.create_database);
        assert_eq!(config.routing.topic, "home/+/+");
        assert_eq!(config.routing.on_parse_error, ParseErrorPolicy::Stop);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config: InfluxBridgeConfig = json5::from_str("{}").unwrap();
        assert_eq!(config.influxdb.host, "localhost");
        assert_eq!(config.influxdb.port, 8086);
        assert!(config.influxdb.create_database);
        assert_eq!(config.influxdb.timeout_secs, 10);
        assert_eq!(config.routing.ignore_devices, IgnoreSet::from_config(""));
        assert_eq!(config.routing.on_parse_error, ParseErrorPolicy::Skip);
        assert_eq!(config.influxdb.base_url(), "http://localhost:8086");
    }

    #[test]
    fn test_defaults_need_topic_pattern_and_database() {
        let config = InfluxBridgeConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("routing.topic"));
    }

    #[test]
    fn test_env_only_configuration() {
        let mut config = InfluxBridgeConfig::default();
        config
            .apply_env(&env(&[
                ("MQTT_ADDRESS", "mosquitto"),
                ("MQTT_USER", "bridge"),
                ("MQTT_PASSWORD", "pw"),
                ("MQTT_TOPIC", "home/+/+"),
                ("MQTT_REGEX", "home/([^/]+)/([^/]+)"),
                ("MQTT_CLIENT_ID", "mqttinfluxdbbridge"),
                ("MQTT_IGNORE_MEASUREMENTS", "status"),
                ("INFLUXDB_ADDRESS", "influxdb"),
                ("INFLUXDB_PORT", "8087"),
                ("INFLUXDB_USER", "root"),
                ("INFLUXDB_PASSWORD", "root"),
                ("INFLUXDB_DATABASE", "home_db"),
            ]))
            .unwrap();

        assert_eq!(config.mqtt.host, "mosquitto");
        assert_eq!(config.mqtt.client_id.as_deref(), Some("mqttinfluxdbbridge"));
        assert_eq!(config.routing.topic, "home/+/+");
        assert_eq!(
            config.routing.ignore_measurements,
            IgnoreSet::from_config("status")
        );
        assert_eq!(config.influxdb.host, "influxdb");
        assert_eq!(config.influxdb.port, 8087);
        assert_eq!(config.influxdb.database, "home_db");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_invalid_influx_port() {
        let mut config = InfluxBridgeConfig::default();
        let result = config.apply_env(&env(&[("INFLUXDB_PORT", "eighty")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_pattern_group_count() {
        let mut config = InfluxBridgeConfig::default();
        config.routing.topic = "home/#".to_string();
        config.routing.pattern = "^home/(.+)$".to_string();
        config.influxdb.database = "home".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, BridgeError::ConfigValidation(_)));
        assert!(err.to_string().contains("capture groups"));
    }

    #[test]
    fn test_validate_missing_database() {
        let mut config = InfluxBridgeConfig::default();
        config.routing.topic = "home/+/+".to_string();
        config.routing.pattern = "^home/([^/]+)/([^/]+)$".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("influxdb.database"));
    }

    #[test]
    fn test_https_base_url() {
        let influx = InfluxDbConfig {
            host: "influx.example.com".to_string(),
            port: 443,
            https: true,
            ..Default::default()
        };
        assert_eq!(influx.base_url(), "https://influx.example.com:443");
    }
}
