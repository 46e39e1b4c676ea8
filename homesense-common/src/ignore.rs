//! Ignore lists for devices and measurements.
//!
//! Ignore lists are configured as a single comma-separated string, e.g.
//! `"garage,shed"`. The string is split verbatim:
//!
//! - tokens are not trimmed, so `"a, b"` yields `"a"` and `" b"`;
//! - an empty string yields a set holding one empty token, so a device or
//!   measurement named `""` is always ignored.
//!
//! Both behaviors are kept for compatibility with existing deployments.

use std::collections::HashSet;
use std::convert::Infallible;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Separator between ignore-list tokens.
pub const IGNORE_LIST_SEPARATOR: char = ',';

/// Set of names that are silently dropped during routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreSet {
    tokens: HashSet<String>,
}

impl IgnoreSet {
    /// Build an ignore set from a comma-separated configuration string.
    pub fn from_config(config: &str) -> Self {
        Self {
            tokens: config
                .split(IGNORE_LIST_SEPARATOR)
                .map(str::to_string)
                .collect(),
        }
    }

    /// Check whether `name` is ignored.
    pub fn contains(&self, name: &str) -> bool {
        self.tokens.contains(name)
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Always `false` for sets built from configuration.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterate over the tokens in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    /// Rebuild the comma-separated form (token order is sorted).
    pub fn to_config(&self) -> String {
        let mut tokens: Vec<&str> = self.iter().collect();
        tokens.sort_unstable();
        tokens.join(",")
    }
}

impl FromStr for IgnoreSet {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_config(s))
    }
}

/// The set built from an empty configuration string: `{""}`.
impl Default for IgnoreSet {
    fn default() -> Self {
        Self::from_config("")
    }
}

impl Serialize for IgnoreSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_config())
    }
}

impl<'de> Deserialize<'de> for IgnoreSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_config(&raw))
    }
}
