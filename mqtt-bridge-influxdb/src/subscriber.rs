//! MQTT subscription loop.

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, Outgoing, QoS};
use thiserror::Error;

use crate::ingest::{IngestError, MessageHandler};
use crate::store::PointWriter;

/// Telemetry is delivered at most once.
const SUBSCRIBE_QOS: QoS = QoS::AtMostOnce;

/// Errors that end the subscription loop.
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("Failed to subscribe: {0}")]
    Subscribe(#[from] rumqttc::ClientError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Whether the loop keeps polling after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Subscribes to the telemetry topic and feeds every message to the handler.
pub struct TelemetrySubscriber<W> {
    handler: MessageHandler<W>,
    client: AsyncClient,
    topic: String,
}

impl<W: PointWriter> TelemetrySubscriber<W> {
    pub fn new(handler: MessageHandler<W>, client: AsyncClient, topic: impl Into<String>) -> Self {
        Self {
            handler,
            client,
            topic: topic.into(),
        }
    }

    pub fn handler(&self) -> &MessageHandler<W> {
        &self.handler
    }

    /// React to one event from the MQTT event loop.
    pub async fn handle_event(&self, event: Event) -> Result<Flow, SubscriberError> {
        match event {
            Event::Incoming(Incoming::ConnAck(ack)) => {
                tracing::info!(code = ?ack.code, "Connected to MQTT broker");
                // Subscribed on every connect; a fresh session has no subscriptions.
                self.client.try_subscribe(&self.topic, SUBSCRIBE_QOS)?;
                tracing::info!("Subscribing to {}", self.topic);
            }
            Event::Incoming(Incoming::SubAck(ack)) => {
                tracing::debug!(pkid = ack.pkid, codes = ?ack.return_codes, "Subscription acknowledged");
            }
            Event::Incoming(Incoming::Publish(publish)) => {
                tracing::debug!("{} {:?}", publish.topic, publish.payload);
                self.handler.handle(&publish.topic, &publish.payload).await?;
            }
            Event::Incoming(Incoming::Disconnect) => {
                tracing::warn!("Broker closed the MQTT session");
                return Ok(Flow::Stop);
            }
            Event::Outgoing(Outgoing::Disconnect) => {
                tracing::info!("Disconnected from MQTT broker");
                return Ok(Flow::Stop);
            }
            event => tracing::trace!(?event, "MQTT event"),
        }
        Ok(Flow::Continue)
    }

    /// Poll the event loop until the client disconnects or an error occurs.
    pub async fn run(self, mut eventloop: EventLoop) -> Result<(), SubscriberError> {
        loop {
            let event = eventloop.poll().await?;
            if self.handle_event(event).await? == Flow::Stop {
                return Ok(());
            }
        }
    }
}
