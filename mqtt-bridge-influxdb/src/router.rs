//! Topic routing: turns an MQTT `(topic, payload)` pair into a [`Reading`].
//!
//! Routing happens in three steps, in this order:
//!
//! 1. the route pattern extracts `(device, measurement)` from the topic;
//! 2. ignored devices and measurements are dropped;
//! 3. the payload is parsed as a finite number.
//!
//! Ignore lists are checked before the payload is parsed, so a garbage
//! payload on an ignored topic never produces a [`ParseError`].

use homesense_common::{IgnoreSet, Reading};
use regex::Regex;
use thiserror::Error;

use crate::config::RoutingConfig;

/// Number of capture groups a route pattern must define.
pub const ROUTE_PATTERN_GROUPS: usize = 2;

/// Error when compiling a route pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Invalid route pattern '{pattern}': {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(
        "Route pattern '{pattern}' must have exactly 2 capture groups (device, measurement), found {found}"
    )]
    GroupCount { pattern: String, found: usize },
}

/// The payload of a routed message is not a finite number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Payload {payload:?} on topic '{topic}' is not a number")]
pub struct ParseError {
    /// Topic the payload arrived on.
    pub topic: String,
    /// The offending payload.
    pub payload: String,
}

/// Result of routing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// The message produced a reading.
    Reading(Reading),
    /// The device or measurement is ignored.
    Filtered,
    /// The topic does not match the route pattern.
    NoMatch,
}

/// Compiled route pattern.
///
/// Group 1 is the device, group 2 the measurement. The pattern is anchored at
/// the start of the topic; it only has to match the whole topic if it ends
/// with `$`.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    pattern: String,
    regex: Regex,
}

impl RoutePattern {
    /// Compile a route pattern.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let regex =
            Regex::new(&format!(r"\A(?:{})", pattern)).map_err(|source| PatternError::Invalid {
                pattern: pattern.to_string(),
                source,
            })?;

        let found = regex.captures_len() - 1;
        if found != ROUTE_PATTERN_GROUPS {
            return Err(PatternError::GroupCount {
                pattern: pattern.to_string(),
                found,
            });
        }

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as configured.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Extract `(device, measurement)` from a topic.
    ///
    /// Returns `None` when the pattern does not match or when either group
    /// did not take part in the match.
    pub fn extract<'t>(&self, topic: &'t str) -> Option<(&'t str, &'t str)> {
        let captures = self.regex.captures(topic)?;
        let device = captures.get(1)?.as_str();
        let measurement = captures.get(2)?.as_str();
        Some((device, measurement))
    }
}

/// Parse a payload as a finite `f64`, tolerating surrounding ASCII whitespace.
pub fn parse_value(payload: &str) -> Option<f64> {
    payload
        .trim_ascii()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Route one message.
pub fn route(
    topic: &str,
    payload: &str,
    pattern: &RoutePattern,
    ignored_devices: &IgnoreSet,
    ignored_measurements: &IgnoreSet,
) -> Result<RouteOutcome, ParseError> {
    let Some((device, measurement)) = pattern.extract(topic) else {
        return Ok(RouteOutcome::NoMatch);
    };

    if ignored_devices.contains(device) || ignored_measurements.contains(measurement) {
        return Ok(RouteOutcome::Filtered);
    }

    let value = parse_value(payload).ok_or_else(|| ParseError {
        topic: topic.to_string(),
        payload: payload.to_string(),
    })?;

    Ok(RouteOutcome::Reading(Reading::new(device, measurement, value)))
}

/// Route pattern and ignore lists, built once at startup.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    pattern: RoutePattern,
    ignored_devices: IgnoreSet,
    ignored_measurements: IgnoreSet,
}

impl TopicRouter {
    /// Create a router from its parts.
    pub fn new(
        pattern: RoutePattern,
        ignored_devices: IgnoreSet,
        ignored_measurements: IgnoreSet,
    ) -> Self {
        Self {
            pattern,
            ignored_devices,
            ignored_measurements,
        }
    }

    /// Build a router from the routing configuration.
    pub fn from_config(config: &RoutingConfig) -> Result<Self, PatternError> {
        Ok(Self::new(
            RoutePattern::new(&config.pattern)?,
            config.ignore_devices.clone(),
            config.ignore_measurements.clone(),
        ))
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn ignored_devices(&self) -> &IgnoreSet {
        &self.ignored_devices
    }

    pub fn ignored_measurements(&self) -> &IgnoreSet {
        &self.ignored_measurements
    }

    /// Route one message through this router.
    pub fn route(&self, topic: &str, payload: &str) -> Result<RouteOutcome, ParseError> {
        route(
            topic,
            payload,
            &self.pattern,
            &self.ignored_devices,
            &self.ignored_measurements,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: &str = r"^sensors/([^/]+)/([^/]+)$";

    fn router(devices: &str, measurements: &str) -> TopicRouter {
        TopicRouter::new(
            RoutePattern::new(PATTERN).unwrap(),
            IgnoreSet::from_config(devices),
            IgnoreSet::from_config(measurements),
        )
    }

    #[test]
    fn test_pattern_requires_two_groups() {
        assert!(matches!(
            RoutePattern::new(r"^sensors/([^/]+)$"),
            Err(PatternError::GroupCount { found: 1, .. })
        ));
        assert!(matches!(
            RoutePattern::new(r"^(a)/(b)/(c)$"),
            Err(PatternError::GroupCount { found: 3, .. })
        ));
        assert!(RoutePattern::new(r"^(?:home|office)/(\w+)/(\w+)$").is_ok());
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            RoutePattern::new(r"^sensors/(["),
            Err(PatternError::Invalid { .. })
        ));
    }

    #[test]
    fn test_pattern_is_anchored_at_start() {
        let pattern = RoutePattern::new(r"sensors/([^/]+)/([^/]+)").unwrap();
        assert_eq!(
            pattern.extract("sensors/fridge/temperature"),
            Some(("fridge", "temperature"))
        );
        assert_eq!(pattern.extract("home/sensors/fridge/temperature"), None);
    }

    #[test]
    fn test_pattern_prefix_match_without_end_anchor() {
        let pattern = RoutePattern::new(r"sensors/([^/]+)/([^/]+)").unwrap();
        assert_eq!(
            pattern.extract("sensors/fridge/temperature/raw"),
            Some(("fridge", "temperature"))
        );
    }

    #[test]
    fn test_optional_group_not_matched() {
        let pattern = RoutePattern::new(r"^sensors/([^/]+)(?:/([^/]+))?$").unwrap();
        assert_eq!(pattern.extract("sensors/fridge"), None);
        assert_eq!(pattern.extract("sensors/fridge/door"), Some(("fridge", "door")));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("21.5"), Some(21.5));
        assert_eq!(parse_value(" 7\n"), Some(7.0));
        assert_eq!(parse_value("-3e2"), Some(-300.0));
        assert_eq!(parse_value("+.5"), Some(0.5));
        assert_eq!(parse_value("not-a-number"), None);
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("NaN"), None);
        assert_eq!(parse_value("inf"), None);
        assert_eq!(parse_value("21,5"), None);
    }

    #[test]
    fn test_route_reading() {
        let outcome = router("", "").route("sensors/fridge/temperature", "21.5");
        assert_eq!(
            outcome,
            Ok(RouteOutcome::Reading(Reading::new(
                "fridge",
                "temperature",
                21.5
            )))
        );
    }

    #[test]
    fn test_route_no_match() {
        let router = router("", "");
        assert_eq!(
            router.route("other/fridge/temperature", "21.5"),
            Ok(RouteOutcome::NoMatch)
        );
        assert_eq!(
            router.route("sensors/fridge/temperature/extra", "garbage"),
            Ok(RouteOutcome::NoMatch)
        );
    }

    #[test]
    fn test_route_filtered_device() {
        assert_eq!(
            router("fridge", "").route("sensors/fridge/temperature", "21.5"),
            Ok(RouteOutcome::Filtered)
        );
    }

    #[test]
    fn test_route_filtered_measurement() {
        assert_eq!(
            router("", "status").route("sensors/fridge/status", "online"),
            Ok(RouteOutcome::Filtered)
        );
    }

    #[test]
    fn test_filter_before_parse() {
        let router = router("fridge", "battery");
        assert_eq!(
            router.route("sensors/fridge/temperature", "not-a-number"),
            Ok(RouteOutcome::Filtered)
        );
        assert_eq!(
            router.route("sensors/porch/battery", "low"),
            Ok(RouteOutcome::Filtered)
        );
    }

    #[test]
    fn test_route_parse_error() {
        let err = router("", "")
            .route("sensors/fridge/temperature", "not-a-number")
            .unwrap_err();
        assert_eq!(err.topic, "sensors/fridge/temperature");
        assert_eq!(err.payload, "not-a-number");
    }

    #[test]
    fn test_default_ignore_lists_filter_empty_names() {
        let config = RoutingConfig {
            pattern: r"^sensors/([^/]*)/([^/]*)$".to_string(),
            ..Default::default()
        };
        let router = TopicRouter::from_config(&config).unwrap();

        assert_eq!(
            router.route("sensors//temperature", "warm"),
            Ok(RouteOutcome::Filtered)
        );
        assert_eq!(
            router.route("sensors/fridge/", "warm"),
            Ok(RouteOutcome::Filtered)
        );
    }

    #[test]
    fn test_untrimmed_ignore_tokens_do_not_match() {
        let router = router("garage, fridge", "");
        assert!(matches!(
            router.route("sensors/fridge/temperature", "4"),
            Ok(RouteOutcome::Reading(_))
        ));
        assert_eq!(
            router.route("sensors/garage/temperature", "4"),
            Ok(RouteOutcome::Filtered)
        );
    }

    #[test]
    fn test_from_config() {
        let config = RoutingConfig {
            topic: "sensors/#".to_string(),
            pattern: PATTERN.to_string(),
            ignore_devices: IgnoreSet::from_config("a,b"),
            ignore_measurements: IgnoreSet::default(),
            ..Default::default()
        };
        let router = TopicRouter::from_config(&config).unwrap();
        assert_eq!(router.pattern().as_str(), PATTERN);
        assert_eq!(router.ignored_devices().len(), 2);
        assert!(router.ignored_measurements().contains(""));
    }
}
