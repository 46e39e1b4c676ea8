//! MQTT to InfluxDB bridge.
//!
//! Subscribes to a topic filter on the broker, extracts the device and the
//! measurement from each topic with a two-group regular expression, and
//! writes numeric payloads to InfluxDB.
//!
//! # Topic routing
//!
//! With the pattern `^home/([^/]+)/([^/]+)$`:
//!
//! ```text
//! home/fridge/temperature  "21.5"  ->  temperature,device=fridge value=21.5
//! home/fridge/status       "on"    ->  dropped when "status" is an ignored measurement
//! office/lamp/power        "3"     ->  dropped, topic does not match
//! ```

pub mod config;
pub mod ingest;
pub mod router;
pub mod store;
pub mod subscriber;

pub use config::{InfluxBridgeConfig, InfluxDbConfig, ParseErrorPolicy, RoutingConfig};
pub use ingest::{Handled, IngestError, IngestStats, IngestStatsSnapshot, MessageHandler};
pub use router::{ParseError, PatternError, RouteOutcome, RoutePattern, TopicRouter, route};
pub use store::{InfluxDbWriter, PointWriter, StoreError, line_protocol};
pub use subscriber::{SubscriberError, TelemetrySubscriber};
