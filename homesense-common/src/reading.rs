use serde::{Deserialize, Serialize};

/// A single numeric measurement tagged by its originating device.
///
/// Readings are produced by routing one inbound MQTT message and handed
/// straight to the store; they carry no identity beyond their fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Device identifier extracted from the topic (e.g., "fridge").
    pub device: String,

    /// Measurement name extracted from the topic (e.g., "temperature").
    pub measurement: String,

    /// Parsed value, always finite.
    pub value: f64,
}

impl Reading {
    pub fn new(device: impl Into<String>, measurement: impl Into<String>, value: f64) -> Self {
        Self {
            device: device.into(),
            measurement: measurement.into(),
            value,
        }
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}={}", self.device, self.measurement, self.value)
    }
}
