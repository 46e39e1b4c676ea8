//! MQTT to InfluxDB bridge.

use anyhow::{Context, Result};
use homesense_bridge_framework::{BridgeRunner, run_bridge};
use mqtt_bridge_influxdb::{
    InfluxBridgeConfig, InfluxDbWriter, MessageHandler, TelemetrySubscriber, TopicRouter,
};

#[tokio::main]
async fn main() -> Result<()> {
    run_bridge(
        "influxdb",
        "influxdb.json5",
        async |runner: &mut BridgeRunner<InfluxBridgeConfig>| {
            let routing = runner.config().routing.clone();
            let influx = runner.config().influxdb.clone();

            let router =
                TopicRouter::from_config(&routing).context("Invalid routing configuration")?;
            let writer = InfluxDbWriter::new(&influx).context("Failed to create InfluxDB client")?;

            if influx.create_database {
                writer.ensure_database().await.with_context(|| {
                    format!("Failed to prepare InfluxDB database '{}'", influx.database)
                })?;
            }

            tracing::info!(
                "Writing to InfluxDB at {} (database '{}')",
                writer.base_url(),
                writer.database()
            );

            let handler = MessageHandler::new(router, writer, routing.on_parse_error);
            let stats = handler.stats();

            let eventloop = runner
                .take_eventloop()
                .context("MQTT event loop already taken")?;
            let subscriber =
                TelemetrySubscriber::new(handler, runner.client().clone(), &routing.topic);

            runner.spawn_with_error("mqtt-subscriber", async move {
                let result = subscriber.run(eventloop).await;

                let stats = stats.snapshot();
                tracing::info!(
                    "Final statistics: {} received, {} written, {} filtered, {} unmatched, {} parse errors, {} invalid points",
                    stats.received,
                    stats.written,
                    stats.filtered,
                    stats.unmatched,
                    stats.parse_errors,
                    stats.invalid_points
                );

                result
            });

            Ok(Some(serde_json::json!({
                "topic": routing.topic,
                "pattern": routing.pattern,
                "database": influx.database,
            })))
        },
    )
    .await
}
