//! InfluxDB point writer.
//!
//! Points are written through the InfluxDB 1.x HTTP API as line protocol:
//!
//! ```text
//! <measurement>,device=<device> value=<value>
//! ```
//!
//! The server assigns the timestamp.

use std::future::Future;

use homesense_common::Reading;
use reqwest::{Client, RequestBuilder};
use thiserror::Error;

use crate::config::InfluxDbConfig;

/// Tag key holding the device name.
pub const DEVICE_TAG: &str = "device";

/// Field key holding the reading value.
pub const VALUE_FIELD: &str = "value";

/// Errors from the time-series store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure (connect, timeout, body read).
    #[error("InfluxDB request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("InfluxDB returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The server answered with something that is not a query result.
    #[error("Unexpected InfluxDB response: {0}")]
    Response(String),

    /// The reading cannot be expressed in line protocol.
    #[error("Cannot encode point {reading}: {reason}")]
    InvalidPoint { reading: Reading, reason: String },
}

impl StoreError {
    /// Whether the error concerns a single point rather than the store.
    pub fn is_point_error(&self) -> bool {
        matches!(self, Self::InvalidPoint { .. })
    }
}

/// Destination for readings.
pub trait PointWriter: Send + Sync {
    /// Write one reading as a point.
    fn write_point(&self, reading: &Reading) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Escape a measurement name.
fn escape_measurement(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if matches!(c, ',' | ' ') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escape a tag value.
fn escape_tag_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Encode a reading as one line of line protocol.
///
/// An empty device produces no tag at all, since line protocol does not
/// allow empty tag values.
pub fn line_protocol(reading: &Reading) -> Result<String, StoreError> {
    let invalid = |reason: &str| StoreError::InvalidPoint {
        reading: reading.clone(),
        reason: reason.to_string(),
    };

    if reading.measurement.is_empty() {
        return Err(invalid("empty measurement"));
    }
    if reading.measurement.contains(['\n', '\r']) || reading.device.contains(['\n', '\r']) {
        return Err(invalid("line break in name"));
    }
    if !reading.value.is_finite() {
        return Err(invalid("value is not finite"));
    }

    let mut line = escape_measurement(&reading.measurement);
    if !reading.device.is_empty() {
        line.push(',');
        line.push_str(DEVICE_TAG);
        line.push('=');
        line.push_str(&escape_tag_value(&reading.device));
    }
    line.push(' ');
    line.push_str(VALUE_FIELD);
    line.push('=');
    line.push_str(&reading.value.to_string());

    Ok(line)
}

/// Extract database names from a `SHOW DATABASES` response body.
pub fn parse_database_names(body: &str) -> Result<Vec<String>, StoreError> {
    let response: serde_json::Value =
        serde_json::from_str(body).map_err(|e| StoreError::Response(e.to_string()))?;

    let result = response
        .get("results")
        .and_then(|results| results.get(0))
        .ok_or_else(|| StoreError::Response("missing results".to_string()))?;

    if let Some(error) = result.get("error").and_then(|e| e.as_str()) {
        return Err(StoreError::Response(error.to_string()));
    }

    // A server without databases omits `series` entirely.
    let names = result
        .get("series")
        .and_then(|series| series.get(0))
        .and_then(|series| series.get("values"))
        .and_then(|values| values.as_array())
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get(0).and_then(|name| name.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(names)
}

/// Quote an identifier for InfluxQL.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Writes readings to an InfluxDB 1.x server over HTTP.
#[derive(Debug, Clone)]
pub struct InfluxDbWriter {
    client: Client,
    base_url: String,
    database: String,
    username: Option<String>,
    password: Option<String>,
}

impl InfluxDbWriter {
    /// Create a writer from the connection settings.
    pub fn new(config: &InfluxDbConfig) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_ref()),
            None => request,
        }
    }

    /// Build the write request for a reading.
    pub fn write_request(&self, reading: &Reading) -> Result<RequestBuilder, StoreError> {
        let line = line_protocol(reading)?;
        let request = self
            .client
            .post(format!("{}/write", self.base_url))
            .query(&[("db", self.database.as_str())])
            .body(line);
        Ok(self.with_auth(request))
    }

    /// Build a `SHOW DATABASES` request.
    pub fn show_databases_request(&self) -> RequestBuilder {
        let request = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[("q", "SHOW DATABASES")]);
        self.with_auth(request)
    }

    /// Build a `CREATE DATABASE` request for the configured database.
    pub fn create_database_request(&self) -> RequestBuilder {
        let statement = format!("CREATE DATABASE {}", quote_identifier(&self.database));
        let request = self
            .client
            .post(format!("{}/query", self.base_url))
            .query(&[("q", statement.as_str())]);
        self.with_auth(request)
    }

    /// Create the configured database when the server does not have it.
    ///
    /// Returns `true` when the database was created.
    pub async fn ensure_database(&self) -> Result<bool, StoreError> {
        let body = send(self.show_databases_request()).await?;
        let databases = parse_database_names(&body)?;

        if databases.iter().any(|name| name == &self.database) {
            tracing::debug!("InfluxDB database '{}' exists", self.database);
            return Ok(false);
        }

        tracing::info!("Creating InfluxDB database '{}'", self.database);
        send(self.create_database_request()).await?;
        Ok(true)
    }
}

/// Send a request and return the body of a successful response.
async fn send(request: RequestBuilder) -> Result<String, StoreError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(StoreError::Status {
            status: status.as_u16(),
            body: body.trim().to_string(),
        });
    }

    Ok(body)
}

impl PointWriter for InfluxDbWriter {
    async fn write_point(&self, reading: &Reading) -> Result<(), StoreError> {
        send(self.write_request(reading)?).await?;
        tracing::trace!("Wrote point {} to '{}'", reading, self.database);
        Ok(())
    }
}
