//! Serial bridge configuration.

use homesense_bridge_framework::{
    BridgeConfig, BridgeError, EnvSource, LoggingConfig, MqttConfig, Result,
};
use homesense_common::env_parse;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete serial bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SerialBridgeConfig {
    /// MQTT broker connection settings.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Serial port settings.
    #[serde(default)]
    pub serial: SerialConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial device path (e.g., "/dev/ttyS0" or "COM1").
    #[serde(default = "default_port")]
    pub port: String,

    /// Baud rate (default: 9600).
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Data bits: 5, 6, 7, or 8 (default: 8).
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    /// Parity: "none", "even", or "odd" (default: "none").
    #[serde(default = "default_parity")]
    pub parity: String,

    /// Stop bits: 1 or 2 (default: 1).
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,

    /// Longest accepted line in bytes, terminator included.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

fn default_port() -> String {
    "/dev/ttyS0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

fn default_max_line_length() -> usize {
    4096
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
            max_line_length: default_max_line_length(),
        }
    }
}

impl SerialConfig {
    /// Validate the port settings.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.port.is_empty() {
            return Err(ConfigError::Validation(
                "serial.port cannot be empty".to_string(),
            ));
        }

        if self.baud_rate == 0 {
            return Err(ConfigError::Validation(
                "serial.baud_rate must be greater than 0".to_string(),
            ));
        }

        if !(5..=8).contains(&self.data_bits) {
            return Err(ConfigError::Validation(format!(
                "invalid data_bits {} (use 5, 6, 7, or 8)",
                self.data_bits
            )));
        }

        match self.parity.to_lowercase().as_str() {
            "none" | "even" | "odd" => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "invalid parity '{}' (use none, even, or odd)",
                    self.parity
                )));
            }
        }

        if !matches!(self.stop_bits, 1 | 2) {
            return Err(ConfigError::Validation(format!(
                "invalid stop_bits {} (use 1 or 2)",
                self.stop_bits
            )));
        }

        if self.max_line_length == 0 {
            return Err(ConfigError::Validation(
                "serial.max_line_length must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl BridgeConfig for SerialBridgeConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn apply_env(&mut self, env: &impl EnvSource) -> Result<()> {
        self.mqtt.apply_env(env)?;

        if let Some(port) = env.var("SERIAL_PORT") {
            self.serial.port = port;
        }
        if let Some(baud_rate) = env_parse(env, "SERIAL_BAUD_RATE")? {
            self.serial.baud_rate = baud_rate;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.validate_mqtt()?;
        self.serial
            .validate()
            .map_err(|e| BridgeError::validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config: SerialBridgeConfig = json5::from_str("{}").unwrap();
        assert_eq!(config.serial.port, "/dev/ttyS0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.serial.parity, "none");
        assert_eq!(config.serial.stop_bits, 1);
        assert_eq!(config.serial.max_line_length, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let json = r#"{
            mqtt: { host: "broker.lan", username: "serial", password: "pw" },
            serial: {
                port: "/dev/ttyUSB0",
                baud_rate: 115200,
                parity: "even",
                stop_bits: 2
            },
            logging: { level: "debug" }
        }"#;

        let config: SerialBridgeConfig = json5::from_str(json).unwrap();
        assert_eq!(config.mqtt.host, "broker.lan");
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.parity, "even");
        assert_eq!(config.serial.stop_bits, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<String, String> = [
            ("MQTT_ADDRESS", "10.0.0.2"),
            ("MQTT_CLIENT_ID", "serialbridge"),
            ("SERIAL_PORT", "/dev/ttyAMA0"),
            ("SERIAL_BAUD_RATE", "19200"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut config = SerialBridgeConfig::default();
        config.apply_env(&env).unwrap();

        assert_eq!(config.mqtt.host, "10.0.0.2");
        assert_eq!(config.mqtt.client_id.as_deref(), Some("serialbridge"));
        assert_eq!(config.serial.port, "/dev/ttyAMA0");
        assert_eq!(config.serial.baud_rate, 19200);
    }

    #[test]
    fn test_env_invalid_baud_rate() {
        let env: HashMap<String, String> =
            HashMap::from([("SERIAL_BAUD_RATE".to_string(), "fast".to_string())]);
        let mut config = SerialBridgeConfig::default();
        assert!(config.apply_env(&env).is_err());
    }

    #[test]
    fn test_validate_parity() {
        let serial = SerialConfig {
            parity: "mark".to_string(),
            ..Default::default()
        };
        let err = serial.validate().unwrap_err();
        assert!(err.to_string().contains("invalid parity"));

        let upper = SerialConfig {
            parity: "ODD".to_string(),
            ..Default::default()
        };
        assert!(upper.validate().is_ok());
    }

    #[test]
    fn test_validate_framing() {
        let bad_data_bits = SerialConfig {
            data_bits: 9,
            ..Default::default()
        };
        assert!(bad_data_bits.validate().is_err());

        let bad_stop_bits = SerialConfig {
            stop_bits: 3,
            ..Default::default()
        };
        assert!(bad_stop_bits.validate().is_err());

        let no_port = SerialConfig {
            port: String::new(),
            ..Default::default()
        };
        assert!(no_port.validate().is_err());

        let zero_baud = SerialConfig {
            baud_rate: 0,
            ..Default::default()
        };
        assert!(zero_baud.validate().is_err());
    }
}
