//! Serial line splitting.
//!
//! Devices write one record per line in the form `<topic>,<value>`:
//!
//! ```text
//! kitchen/temp,21.5
//! ```
//!
//! Fields past the second are discarded. Nothing is trimmed and the value is
//! not validated; it is published as-is.

use thiserror::Error;

/// Separator between the topic and the value.
pub const FIELD_SEPARATOR: char = ',';

/// One record read from the serial line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialRecord {
    /// Topic to publish on.
    pub topic: String,
    /// Value to publish, verbatim.
    pub raw_value: String,
}

/// The line has no separator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed serial line {line:?}: expected '<topic>,<value>'")]
pub struct MalformedLine {
    /// The line with its terminator removed.
    pub line: String,
}

/// Remove one trailing `\r\n`, `\n` or `\r`.
pub fn strip_terminator(line: &str) -> &str {
    line.strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .or_else(|| line.strip_suffix('\r'))
        .unwrap_or(line)
}

/// Split a raw serial line into a [`SerialRecord`].
///
/// Invalid UTF-8 is replaced with U+FFFD.
pub fn split(line: &[u8]) -> Result<SerialRecord, MalformedLine> {
    let decoded = String::from_utf8_lossy(line);
    let text = strip_terminator(&decoded);

    let mut fields = text.split(FIELD_SEPARATOR);
    match (fields.next(), fields.next()) {
        (Some(topic), Some(raw_value)) => Ok(SerialRecord {
            topic: topic.to_string(),
            raw_value: raw_value.to_string(),
        }),
        _ => Err(MalformedLine {
            line: text.to_string(),
        }),
    }
}
