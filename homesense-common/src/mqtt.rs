use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions};

use crate::config::MqttConfig;
use crate::error::Result;

/// Build rumqttc options from the configuration.
///
/// `bridge` names the bridge and seeds the generated client id when none is
/// configured.
pub fn mqtt_options(config: &MqttConfig, bridge: &str) -> Result<MqttOptions> {
    config.validate()?;

    let client_id = config.resolved_client_id(bridge);
    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    if let Some(user) = &config.username {
        options.set_credentials(user.clone(), config.password.clone().unwrap_or_default());
    }

    Ok(options)
}

/// Create an MQTT client and its event loop.
///
/// No network I/O happens until the event loop is polled.
pub fn connect(
    config: &MqttConfig,
    bridge: &str,
    last_will: Option<LastWill>,
) -> Result<(AsyncClient, EventLoop)> {
    let mut options = mqtt_options(config, bridge)?;
    if let Some(will) = last_will {
        options.set_last_will(will);
    }

    tracing::info!(
        host = %config.host,
        port = config.port,
        client_id = %options.client_id(),
        "Connecting to MQTT broker"
    );

    Ok(AsyncClient::new(options, config.channel_capacity))
}
