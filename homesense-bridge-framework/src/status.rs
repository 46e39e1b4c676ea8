//! Bridge status reporting.
//!
//! Status messages are retained JSON on the configured status topic. The
//! "offline" status doubles as the client's Last Will, so the broker
//! publishes it when the bridge dies without disconnecting.

use std::time::{SystemTime, UNIX_EPOCH};

use rumqttc::{LastWill, QoS};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::publisher::Publisher;

/// Lifecycle state reported on the status topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Running,
    Offline,
    Error,
}

/// Bridge status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name (e.g., "influxdb", "serial").
    pub bridge: String,
    /// Bridge version.
    pub version: String,
    /// Current state.
    pub status: BridgeState,
    /// Unix time (seconds) the status was produced. Absent in the Last Will,
    /// which is registered at connect time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Additional metadata (bridge-specific).
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeStatus {
    pub fn new(bridge: impl Into<String>, version: impl Into<String>, status: BridgeState) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status,
            timestamp: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Stamp the status with the current time.
    pub fn now(mut self) -> Self {
        self.timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|elapsed| elapsed.as_secs());
        self
    }

    /// Add metadata to the status.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach an error message.
    pub fn with_error(self, error: impl Into<String>) -> Self {
        self.with_metadata(serde_json::json!({ "error": error.into() }))
    }

    /// Retained Last Will carrying this status.
    pub fn last_will(&self, topic: impl Into<String>) -> Result<LastWill> {
        let payload = serde_json::to_vec(self)?;
        Ok(LastWill::new(topic, payload, QoS::AtLeastOnce, true))
    }
}

/// Publishes the bridge status on startup and shutdown.
pub struct StatusPublisher {
    publisher: Publisher,
    topic: String,
    bridge_name: String,
    version: String,
}

impl StatusPublisher {
    pub fn new(
        publisher: Publisher,
        topic: impl Into<String>,
        bridge_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            topic: topic.into(),
            bridge_name: bridge_name.into(),
            version: version.into(),
        }
    }

    /// Status topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn status(&self, state: BridgeState) -> BridgeStatus {
        BridgeStatus::new(&self.bridge_name, &self.version, state).now()
    }

    async fn publish(&self, status: &BridgeStatus) -> Result<()> {
        self.publisher.publish_json(&self.topic, status, true).await
    }

    /// Publish "running" status with optional metadata.
    pub async fn publish_running(&self, metadata: Option<serde_json::Value>) -> Result<()> {
        let mut status = self.status(BridgeState::Running);
        if let Some(meta) = metadata {
            status = status.with_metadata(meta);
        }
        self.publish(&status).await
    }

    pub async fn publish_offline(&self) -> Result<()> {
        self.publish(&self.status(BridgeState::Offline)).await
    }

    pub async fn publish_error(&self, error: impl Into<String>) -> Result<()> {
        self.publish(&self.status(BridgeState::Error).with_error(error))
            .await
    }
}
