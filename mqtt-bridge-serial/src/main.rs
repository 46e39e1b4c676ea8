//! Serial to MQTT bridge.

use anyhow::Result;
use homesense_bridge_framework::{BridgeRunner, run_bridge};
use mqtt_bridge_serial::{LineForwarder, SerialBridgeConfig, open_port, run_lines};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> Result<()> {
    run_bridge(
        "serial",
        "serial.json5",
        async |runner: &mut BridgeRunner<SerialBridgeConfig>| {
            let serial = runner.config().serial.clone();
            let port = open_port(&serial)?;

            let forwarder = LineForwarder::new(runner.publisher());
            let stats = forwarder.stats();
            let shutdown = runner.shutdown_signal();

            runner.spawn_eventloop_driver();

            let max_line_length = serial.max_line_length;
            runner.spawn_with_error("serial-reader", async move {
                let result =
                    run_lines(BufReader::new(port), &forwarder, max_line_length, shutdown).await;

                let stats = stats.snapshot();
                tracing::info!(
                    "Final statistics: {} lines, {} published, {} malformed, {} overlong",
                    stats.lines,
                    stats.published,
                    stats.malformed,
                    stats.overlong
                );

                result
            });

            Ok(Some(serde_json::json!({
                "port": serial.port,
                "baud_rate": serial.baud_rate,
            })))
        },
    )
    .await
}
