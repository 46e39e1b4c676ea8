//! Serial to MQTT bridge.
//!
//! Reads newline-terminated `<topic>,<value>` records from a serial port and
//! publishes each value on its topic:
//!
//! ```text
//! kitchen/temp,21.5   ->  PUBLISH kitchen/temp "21.5"
//! garbage             ->  skipped (no separator)
//! ```

pub mod config;
pub mod reader;
pub mod splitter;

pub use config::{ConfigError, SerialBridgeConfig, SerialConfig};
pub use reader::{
    ForwardStats, ForwardStatsSnapshot, Forwarded, LineForwarder, SerialError, open_port,
    run_lines,
};
pub use splitter::{MalformedLine, SerialRecord, split};
