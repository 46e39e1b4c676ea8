//! Message publisher for MQTT.

use std::future::Future;

use rumqttc::{AsyncClient, QoS};

use crate::error::{BridgeError, Result};

/// Something that can put a payload on a topic.
///
/// Implemented by [`Publisher`] for the live broker; tests substitute a
/// recording implementation.
pub trait MessagePublisher: Send + Sync {
    /// Publish `payload` on `topic`.
    fn publish(&self, topic: &str, payload: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Publisher for sending messages to the MQTT broker.
///
/// Wraps an rumqttc [`AsyncClient`]. Publishing only enqueues the request;
/// the client's event loop must be polled for it to reach the broker.
#[derive(Clone, Debug)]
pub struct Publisher {
    client: AsyncClient,
    qos: QoS,
}

impl Publisher {
    /// Create a new publisher using QoS 0.
    pub fn new(client: AsyncClient) -> Self {
        Self {
            client,
            qos: QoS::AtMostOnce,
        }
    }

    /// Set the QoS used for every publish.
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Get the QoS level.
    pub fn qos(&self) -> QoS {
        self.qos
    }

    /// Get a reference to the MQTT client.
    pub fn client(&self) -> &AsyncClient {
        &self.client
    }

    /// Publish raw bytes to a topic.
    pub async fn publish_raw(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        self.client
            .publish(topic, self.qos, retain, payload)
            .await
            .map_err(|e| BridgeError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    /// Publish a JSON value to a topic.
    pub async fn publish_json<T: serde::Serialize>(
        &self,
        topic: &str,
        value: &T,
        retain: bool,
    ) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.publish_raw(topic, payload, retain).await
    }
}

impl MessagePublisher for Publisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        self.publish_raw(topic, payload.as_bytes().to_vec(), false)
            .await
    }
}
