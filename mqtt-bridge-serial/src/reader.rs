//! Serial line reader and forwarder.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use homesense_bridge_framework::{BridgeError, MessagePublisher};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio_serial::{DataBits, Parity, SerialPortBuilder, SerialStream, StopBits};

use crate::config::SerialConfig;
use crate::splitter::{SerialRecord, split};

/// Serial reader errors.
#[derive(Debug, Error)]
pub enum SerialError {
    #[error("Failed to open serial port '{port}': {source}")]
    Open {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("Invalid serial setting: {0}")]
    Config(String),

    #[error("Serial port closed")]
    Closed,

    #[error("Serial read failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Publish(#[from] BridgeError),
}

/// Map a parity name to the serial setting.
pub fn parity(name: &str) -> Result<Parity, SerialError> {
    match name.to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "even" => Ok(Parity::Even),
        "odd" => Ok(Parity::Odd),
        other => Err(SerialError::Config(format!("invalid parity '{}'", other))),
    }
}

/// Map a data bit count to the serial setting.
pub fn data_bits(bits: u8) -> Result<DataBits, SerialError> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(SerialError::Config(format!("invalid data_bits {}", other))),
    }
}

/// Map a stop bit count to the serial setting.
pub fn stop_bits(bits: u8) -> Result<StopBits, SerialError> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(SerialError::Config(format!("invalid stop_bits {}", other))),
    }
}

/// Build the port settings from the configuration.
pub fn port_builder(config: &SerialConfig) -> Result<SerialPortBuilder, SerialError> {
    Ok(tokio_serial::new(&config.port, config.baud_rate)
        .data_bits(data_bits(config.data_bits)?)
        .parity(parity(&config.parity)?)
        .stop_bits(stop_bits(config.stop_bits)?))
}

/// Open the configured serial port.
pub fn open_port(config: &SerialConfig) -> Result<SerialStream, SerialError> {
    let builder = port_builder(config)?;
    let stream = SerialStream::open(&builder).map_err(|source| SerialError::Open {
        port: config.port.clone(),
        source,
    })?;

    tracing::info!(
        "Opened serial port {} at {} baud ({}{}{})",
        config.port,
        config.baud_rate,
        config.data_bits,
        config.parity.chars().next().unwrap_or('n').to_ascii_uppercase(),
        config.stop_bits
    );

    Ok(stream)
}

/// Whether `topic` can be published to.
///
/// Wildcards are only valid in subscriptions.
pub fn is_publishable_topic(topic: &str) -> bool {
    !topic.is_empty() && !topic.contains(['+', '#', '\0'])
}

/// Forwarding counters.
#[derive(Debug, Default)]
pub struct ForwardStats {
    /// Lines read from the port.
    pub lines: AtomicU64,
    /// Records published.
    pub published: AtomicU64,
    /// Lines without a separator or with an unusable topic.
    pub malformed: AtomicU64,
    /// Lines longer than the configured maximum.
    pub overlong: AtomicU64,
}

impl ForwardStats {
    fn record(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics.
    pub fn snapshot(&self) -> ForwardStatsSnapshot {
        ForwardStatsSnapshot {
            lines: self.lines.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            overlong: self.overlong.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of forwarding statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardStatsSnapshot {
    pub lines: u64,
    pub published: u64,
    pub malformed: u64,
    pub overlong: u64,
}

/// What happened to a forwarded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forwarded {
    Published(SerialRecord),
    Skipped,
}

/// Splits serial lines and publishes them.
pub struct LineForwarder<P> {
    publisher: P,
    stats: Arc<ForwardStats>,
}

impl<P: MessagePublisher> LineForwarder<P> {
    pub fn new(publisher: P) -> Self {
        Self {
            publisher,
            stats: Arc::new(ForwardStats::default()),
        }
    }

    /// Shared handle to the counters.
    pub fn stats(&self) -> Arc<ForwardStats> {
        Arc::clone(&self.stats)
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Split one line and publish its value.
    ///
    /// Malformed lines are logged and skipped; publish failures are returned.
    pub async fn forward(&self, line: &[u8]) -> Result<Forwarded, SerialError> {
        self.stats.record(&self.stats.lines);

        let record = match split(line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("{}", e);
                self.stats.record(&self.stats.malformed);
                return Ok(Forwarded::Skipped);
            }
        };

        if !is_publishable_topic(&record.topic) {
            tracing::warn!("Cannot publish to topic {:?}, skipping line", record.topic);
            self.stats.record(&self.stats.malformed);
            return Ok(Forwarded::Skipped);
        }

        self.publisher
            .publish(&record.topic, &record.raw_value)
            .await?;
        tracing::debug!("Published {} = {:?}", record.topic, record.raw_value);
        self.stats.record(&self.stats.published);

        Ok(Forwarded::Published(record))
    }
}

/// Result of reading one bounded line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineRead {
    Line,
    Overlong(usize),
    Eof,
}

/// Read up to and including the next `\n`, keeping at most `max` bytes.
///
/// Longer lines are consumed entirely and reported as overlong. A final line
/// without terminator is returned as a line.
async fn read_bounded_line<R>(
    reader: &mut R,
    line: &mut Vec<u8>,
    max: usize,
) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut total = 0;
    let mut overlong = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match (total, overlong) {
                (0, _) => LineRead::Eof,
                (_, true) => LineRead::Overlong(total),
                (_, false) => LineRead::Line,
            });
        }

        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };

        if !overlong {
            if line.len() + used > max {
                overlong = true;
                line.clear();
            } else {
                line.extend_from_slice(&available[..used]);
            }
        }

        total += used;
        reader.consume(used);

        if done {
            return Ok(if overlong {
                LineRead::Overlong(total)
            } else {
                LineRead::Line
            });
        }
    }
}

/// Resolve once the shutdown flag is set or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Forward lines from `reader` until shutdown.
///
/// End of input is an error: a serial port only reaches it when the device
/// goes away.
pub async fn run_lines<R, P>(
    mut reader: R,
    forwarder: &LineForwarder<P>,
    max_line_length: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SerialError>
where
    R: AsyncBufRead + Unpin,
    P: MessagePublisher,
{
    let mut line = Vec::with_capacity(256);

    loop {
        line.clear();

        let read = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => {
                tracing::debug!("Serial reader stopping");
                return Ok(());
            }
            read = read_bounded_line(&mut reader, &mut line, max_line_length) => read?,
        };

        match read {
            LineRead::Line => {
                tracing::trace!("Received: {:?}", String::from_utf8_lossy(&line));
                forwarder.forward(&line).await?;
            }
            LineRead::Overlong(len) => {
                tracing::warn!(
                    "Discarding {} byte line (max_line_length is {})",
                    len,
                    max_line_length
                );
                forwarder.stats.record(&forwarder.stats.overlong);
            }
            LineRead::Eof => return Err(SerialError::Closed),
        }
    }
}
