//! Per-message ingest: route an MQTT message and write the resulting point.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use homesense_common::Reading;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ParseErrorPolicy;
use crate::router::{ParseError, RouteOutcome, TopicRouter};
use crate::store::{PointWriter, StoreError};

/// What happened to a handled message.
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    /// A point was written.
    Written(Reading),
    /// The device or measurement is ignored.
    Filtered,
    /// The topic did not match the route pattern.
    Unmatched,
    /// The message was dropped (bad payload or unencodable point).
    Skipped,
}

/// Errors that stop ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Failed to write {reading}: {source}")]
    Store {
        reading: Reading,
        #[source]
        source: StoreError,
    },
}

/// Ingest counters.
#[derive(Debug, Default)]
pub struct IngestStats {
    /// Messages received from the broker.
    pub received: AtomicU64,
    /// Points written to the store.
    pub written: AtomicU64,
    /// Messages dropped by the ignore lists.
    pub filtered: AtomicU64,
    /// Messages whose topic did not match.
    pub unmatched: AtomicU64,
    /// Messages with a non-numeric payload.
    pub parse_errors: AtomicU64,
    /// Readings the store could not encode.
    pub invalid_points: AtomicU64,
}

impl IngestStats {
    fn record(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics.
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            invalid_points: self.invalid_points.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of ingest statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStatsSnapshot {
    pub received: u64,
    pub written: u64,
    pub filtered: u64,
    pub unmatched: u64,
    pub parse_errors: u64,
    pub invalid_points: u64,
}

/// Routes messages and writes readings to a [`PointWriter`].
pub struct MessageHandler<W> {
    router: TopicRouter,
    writer: W,
    policy: ParseErrorPolicy,
    stats: Arc<IngestStats>,
}

impl<W: PointWriter> MessageHandler<W> {
    pub fn new(router: TopicRouter, writer: W, policy: ParseErrorPolicy) -> Self {
        Self {
            router,
            writer,
            policy,
            stats: Arc::new(IngestStats::default()),
        }
    }

    /// Shared handle to the counters.
    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Handle one message.
    ///
    /// The payload is decoded as UTF-8, replacing invalid sequences.
    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Result<Handled, IngestError> {
        self.stats.record(&self.stats.received);
        let payload = String::from_utf8_lossy(payload);

        let reading = match self.router.route(topic, &payload) {
            Ok(RouteOutcome::Reading(reading)) => reading,
            Ok(RouteOutcome::Filtered) => {
                tracing::trace!("Ignoring {}", topic);
                self.stats.record(&self.stats.filtered);
                return Ok(Handled::Filtered);
            }
            Ok(RouteOutcome::NoMatch) => {
                tracing::trace!("Topic {} does not match route pattern", topic);
                self.stats.record(&self.stats.unmatched);
                return Ok(Handled::Unmatched);
            }
            Err(e) => {
                self.stats.record(&self.stats.parse_errors);
                return match self.policy {
                    ParseErrorPolicy::Skip => {
                        tracing::warn!("Skipping message: {}", e);
                        Ok(Handled::Skipped)
                    }
                    ParseErrorPolicy::Stop => Err(e.into()),
                };
            }
        };

        match self.writer.write_point(&reading).await {
            Ok(()) => {
                tracing::debug!("Stored {}", reading);
                self.stats.record(&self.stats.written);
                Ok(Handled::Written(reading))
            }
            Err(e) if e.is_point_error() => {
                tracing::warn!("Skipping message on {}: {}", topic, e);
                self.stats.record(&self.stats.invalid_points);
                Ok(Handled::Skipped)
            }
            Err(source) => Err(IngestError::Store { reading, source }),
        }
    }
}
