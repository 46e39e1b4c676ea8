//! End-to-end routing tests: configuration file to handled message.

use std::io::Write;
use std::sync::Mutex;

use homesense_bridge_framework::BridgeConfig;
use homesense_common::{IgnoreSet, Reading};
use mqtt_bridge_influxdb::{
    Handled, InfluxBridgeConfig, IngestError, MessageHandler, ParseErrorPolicy, PointWriter,
    RouteOutcome, RoutePattern, StoreError, TopicRouter, line_protocol, route,
};
use tempfile::NamedTempFile;

const PATTERN: &str = r"^sensors/([^/]+)/([^/]+)$";

#[derive(Default)]
struct MemoryStore {
    lines: Mutex<Vec<String>>,
}

impl PointWriter for MemoryStore {
    async fn write_point(&self, reading: &Reading) -> Result<(), StoreError> {
        let line = line_protocol(reading)?;
        self.lines.lock().unwrap().push(line);
        Ok(())
    }
}

fn pattern() -> RoutePattern {
    RoutePattern::new(PATTERN).unwrap()
}

#[test]
fn test_matching_topic_produces_reading() {
    let outcome = route(
        "sensors/fridge/temperature",
        "21.5",
        &pattern(),
        &IgnoreSet::from_config(""),
        &IgnoreSet::from_config(""),
    );

    assert_eq!(
        outcome,
        Ok(RouteOutcome::Reading(Reading {
            device: "fridge".to_string(),
            measurement: "temperature".to_string(),
            value: 21.5,
        }))
    );
}

#[test]
fn test_ignored_device_is_filtered() {
    let outcome = route(
        "sensors/fridge/temperature",
        "21.5",
        &pattern(),
        &IgnoreSet::from_config("fridge"),
        &IgnoreSet::from_config(""),
    );
    assert_eq!(outcome, Ok(RouteOutcome::Filtered));
}

#[test]
fn test_non_numeric_payload_is_parse_error() {
    let err = route(
        "sensors/fridge/temperature",
        "not-a-number",
        &pattern(),
        &IgnoreSet::from_config(""),
        &IgnoreSet::from_config(""),
    )
    .unwrap_err();

    assert_eq!(err.topic, "sensors/fridge/temperature");
    assert_eq!(err.payload, "not-a-number");
}

#[test]
fn test_non_matching_topics_never_error() {
    let pattern = pattern();
    let none = IgnoreSet::from_config("");
    for topic in [
        "",
        "sensors",
        "sensors/fridge",
        "sensors//temperature",
        "sensors/fridge/temperature/raw",
        "home/fridge/temperature",
    ] {
        for payload in ["", "garbage", "1.0"] {
            assert_eq!(
                route(topic, payload, &pattern, &none, &none),
                Ok(RouteOutcome::NoMatch),
                "topic {:?} payload {:?}",
                topic,
                payload
            );
        }
    }
}

#[test]
fn test_empty_names_filtered_without_ignore_config() {
    let pattern = RoutePattern::new(r"^sensors/([^/]*)/([^/]*)$").unwrap();
    let devices = IgnoreSet::from_config("");
    let measurements = IgnoreSet::from_config("");

    for topic in ["sensors//temperature", "sensors/fridge/", "sensors//"] {
        assert_eq!(
            route(topic, "not-a-number", &pattern, &devices, &measurements),
            Ok(RouteOutcome::Filtered),
            "topic {:?}",
            topic
        );
    }
    assert!(matches!(
        route("sensors/fridge/temperature", "4", &pattern, &devices, &measurements),
        Ok(RouteOutcome::Reading(_))
    ));
}

#[test]
fn test_ignored_names_filter_any_payload() {
    let pattern = pattern();
    let devices = IgnoreSet::from_config("garage,shed");
    let measurements = IgnoreSet::from_config("status,uptime");

    for topic in [
        "sensors/garage/temperature",
        "sensors/shed/humidity",
        "sensors/kitchen/status",
        "sensors/porch/uptime",
    ] {
        for payload in ["", "offline", "12", "NaN"] {
            assert_eq!(
                route(topic, payload, &pattern, &devices, &measurements),
                Ok(RouteOutcome::Filtered),
                "topic {:?} payload {:?}",
                topic,
                payload
            );
        }
    }
}

#[tokio::test]
async fn test_config_file_to_store() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            influxdb: {{ database: "home" }},
            routing: {{
                topic: "sensors/+/+",
                pattern: "{}",
                ignore_devices: "garage",
                ignore_measurements: "status",
            }},
        }}"#,
        PATTERN.replace('\\', "\\\\")
    )
    .unwrap();

    let config = InfluxBridgeConfig::load(file.path()).unwrap();
    let router = TopicRouter::from_config(&config.routing).unwrap();
    let handler = MessageHandler::new(router, MemoryStore::default(), config.routing.on_parse_error);

    let messages: [(&str, &[u8]); 5] = [
        ("sensors/fridge/temperature", b"4.5"),
        ("sensors/fridge/status", b"online"),
        ("sensors/garage/temperature", b"12"),
        ("sensors/living room/humidity", b" 41\n"),
        ("sensors/fridge/temperature", b"cold"),
    ];
    let mut handled = Vec::new();
    for (topic, payload) in messages {
        handled.push(handler.handle(topic, payload).await.unwrap());
    }

    assert_eq!(
        handled,
        vec![
            Handled::Written(Reading::new("fridge", "temperature", 4.5)),
            Handled::Filtered,
            Handled::Filtered,
            Handled::Written(Reading::new("living room", "humidity", 41.0)),
            Handled::Skipped,
        ]
    );
    assert_eq!(
        *handler.writer().lines.lock().unwrap(),
        vec![
            "temperature,device=fridge value=4.5".to_string(),
            r"humidity,device=living\ room value=41".to_string(),
        ]
    );

    let stats = handler.stats().snapshot();
    assert_eq!(stats.received, 5);
    assert_eq!(stats.written, 2);
    assert_eq!(stats.filtered, 2);
    assert_eq!(stats.parse_errors, 1);
}

#[tokio::test]
async fn test_stop_policy_surfaces_parse_error() {
    let router = TopicRouter::new(
        pattern(),
        IgnoreSet::from_config(""),
        IgnoreSet::from_config(""),
    );
    let handler = MessageHandler::new(router, MemoryStore::default(), ParseErrorPolicy::Stop);

    let err = handler
        .handle("sensors/fridge/temperature", b"not-a-number")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Parse(_)));
    assert!(handler.writer().lines.lock().unwrap().is_empty());
}

#[test]
fn test_example_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../configs/influxdb.json5");
    let config = InfluxBridgeConfig::load(path).unwrap();

    assert_eq!(config.routing.topic, "home/+/+");
    assert_eq!(config.influxdb.database, "home_db");
    assert!(config.routing.ignore_measurements.contains("status"));
}
