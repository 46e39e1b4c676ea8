//! Bridge runner for lifecycle management.

use std::future::Future;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, Outgoing};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use homesense_common::{LoggingConfig, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::publisher::Publisher;
use crate::status::{BridgeState, BridgeStatus, StatusPublisher};

/// How long workers get to finish after shutdown before they are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Bridge runner that manages the lifecycle of an MQTT bridge.
///
/// Handles:
/// - Logging initialization
/// - MQTT client creation
/// - Worker spawning and management
/// - Graceful shutdown on Ctrl+C / SIGTERM
/// - Stopping the bridge when a worker fails
/// - Status publishing (optional)
///
/// # Example
///
/// ```ignore
/// use homesense_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = BridgeArgs::parse();
///     let config = MyBridgeConfig::resolve(args.config.as_deref(), &ProcessEnv)?;
///
///     let mut runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
///     runner.spawn_eventloop_driver();
///
///     let shutdown = runner.shutdown_signal();
///     runner.spawn_with_error("worker", my_worker(runner.publisher(), shutdown));
///
///     runner.run().await?;
///     Ok(())
/// }
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging and status.
    name: String,
    /// Bridge version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// MQTT client handle.
    client: AsyncClient,
    /// MQTT event loop, until a worker takes it.
    eventloop: Option<EventLoop>,
    /// Publisher for messages.
    publisher: Publisher,
    /// Status publisher (optional).
    status_publisher: Option<StatusPublisher>,
    /// Shutdown signal shared with workers.
    shutdown_tx: watch::Sender<bool>,
    /// Worker failures.
    failure_tx: mpsc::UnboundedSender<BridgeError>,
    failure_rx: mpsc::UnboundedReceiver<BridgeError>,
    /// Spawned tasks.
    tasks: Vec<JoinHandle<()>>,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner.
    ///
    /// This will:
    /// 1. Initialize logging based on config
    /// 2. Create the MQTT client (the connection is made when the event loop is polled)
    /// 3. Create the publisher
    pub fn new(name: impl Into<String>, config: C) -> Result<Self> {
        Self::new_with_args(name, config, None)
    }

    /// Create a new bridge runner with CLI args for log level override.
    pub fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        // Initialize logging with optional CLI override
        let mut log_config: LoggingConfig = config.logging().clone();
        if let Some(level) = args.and_then(|a| a.log_level.clone()) {
            log_config.level = level;
        }

        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        tracing::info!(bridge = %name, version = %version, "Starting bridge");

        // The broker announces "offline" for us if we vanish without a disconnect.
        let last_will = match &config.mqtt().status_topic {
            Some(topic) => Some(
                BridgeStatus::new(&name, &version, BridgeState::Offline).last_will(topic.as_str())?,
            ),
            None => None,
        };

        let (client, eventloop) = homesense_common::connect(config.mqtt(), &name, last_will)?;
        let publisher = Publisher::new(client.clone());

        let (shutdown_tx, _) = watch::channel(false);
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();

        Ok(Self {
            name,
            version,
            config,
            client,
            eventloop: Some(eventloop),
            publisher,
            status_publisher: None,
            shutdown_tx,
            failure_tx,
            failure_rx,
            tasks: Vec::new(),
        })
    }

    /// Enable status publishing.
    ///
    /// Has no effect unless the MQTT configuration names a `status_topic`.
    pub fn with_status_publishing(mut self) -> Self {
        if let Some(topic) = &self.config.mqtt().status_topic {
            self.status_publisher = Some(StatusPublisher::new(
                self.publisher.clone(),
                topic.clone(),
                &self.name,
                &self.version,
            ));
        }
        self
    }

    /// Get the bridge name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the bridge version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Get a reference to the MQTT client.
    pub fn client(&self) -> &AsyncClient {
        &self.client
    }

    /// Get a clone of the publisher.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Receiver that flips to `true` when the bridge is shutting down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Take ownership of the MQTT event loop.
    ///
    /// Returns `None` if it was already taken (or handed to
    /// [`spawn_eventloop_driver`](Self::spawn_eventloop_driver)).
    pub fn take_eventloop(&mut self) -> Option<EventLoop> {
        self.eventloop.take()
    }

    /// Spawn a task that drives the MQTT event loop for publish-only bridges.
    pub fn spawn_eventloop_driver(&mut self) {
        match self.take_eventloop() {
            Some(eventloop) => self.spawn_with_error("mqtt-eventloop", drive_eventloop(eventloop)),
            None => tracing::warn!("MQTT event loop already taken, not spawning driver"),
        }
    }

    /// Spawn a worker task that returns a Result.
    ///
    /// An error stops the whole bridge and [`run`](Self::run) returns it.
    /// Workers are expected to run until shutdown: one that finishes earlier,
    /// even successfully, counts as failed.
    pub fn spawn_with_error<F, E>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let name = name.into();
        let failure_tx = self.failure_tx.clone();
        let shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let result = future.await;
            let stopping = *shutdown.borrow();
            match result {
                Ok(()) if stopping => tracing::debug!(worker = %name, "Worker finished"),
                Ok(()) => {
                    tracing::error!(worker = %name, "Worker exited before shutdown");
                    let _ = failure_tx.send(BridgeError::worker(name, "exited unexpectedly"));
                }
                Err(e) => {
                    tracing::error!(worker = %name, error = %e, "Worker failed");
                    let _ = failure_tx.send(BridgeError::worker(name, e.to_string()));
                }
            }
        });
        self.tasks.push(handle);
    }

    /// Run the bridge until a shutdown signal is received or a worker fails.
    ///
    /// This will:
    /// 1. Publish "running" status (if enabled)
    /// 2. Wait for Ctrl+C, SIGTERM or a worker failure
    /// 3. Signal shutdown to all workers
    /// 4. Publish "offline" (or "error") status and disconnect from the broker
    /// 5. Wait for workers, aborting stragglers
    pub async fn run(self) -> Result<()> {
        self.run_with_metadata(None).await
    }

    /// Run the bridge with custom status metadata.
    pub async fn run_with_metadata(mut self, metadata: Option<serde_json::Value>) -> Result<()> {
        // Publish running status
        if let Some(ref status_pub) = self.status_publisher {
            if let Err(e) = status_pub.publish_running(metadata).await {
                tracing::warn!(error = %e, "Failed to publish running status");
            }
        }

        tracing::info!(
            bridge = %self.name,
            tasks = self.tasks.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        let failure = tokio::select! {
            _ = shutdown_signal() => {
                tracing::info!(bridge = %self.name, "Received shutdown signal");
                None
            }
            Some(err) = self.failure_rx.recv() => Some(err),
        };

        let _ = self.shutdown_tx.send(true);

        if let Some(ref status_pub) = self.status_publisher {
            let published = match &failure {
                Some(err) => status_pub.publish_error(err.to_string()).await,
                None => status_pub.publish_offline().await,
            };
            if let Err(e) = published {
                tracing::warn!(error = %e, "Failed to publish final status");
            }
        }

        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(error = %e, "MQTT disconnect request not delivered");
        }

        // Wait for tasks to complete
        let mut tasks = std::mem::take(&mut self.tasks);
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            for task in tasks.iter_mut() {
                let _ = task.await;
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!("Workers did not stop in time, aborting");
            for task in &tasks {
                task.abort();
            }
        }

        match failure {
            Some(err) => Err(err),
            None => {
                tracing::info!(bridge = %self.name, "Goodbye!");
                Ok(())
            }
        }
    }
}

/// Drive an MQTT event loop until the client disconnects.
///
/// Used by bridges that only publish. Connection errors end the loop; there
/// is no reconnect.
pub async fn drive_eventloop(mut eventloop: EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await? {
            Event::Incoming(Incoming::ConnAck(ack)) => {
                tracing::info!(code = ?ack.code, "Connected to MQTT broker");
            }
            Event::Incoming(Incoming::Disconnect) => {
                tracing::warn!("Broker closed the MQTT session");
                return Ok(());
            }
            Event::Outgoing(Outgoing::Disconnect) => {
                tracing::info!("Disconnected from MQTT broker");
                return Ok(());
            }
            event => tracing::trace!(?event, "MQTT event"),
        }
    }
}

/// Resolve when the process receives Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Convenience function to run a bridge with minimal boilerplate.
///
/// Parses [`BridgeArgs`], resolves the configuration from the file (if any)
/// and the process environment, then hands the runner to `setup`. Whatever
/// `setup` returns becomes the metadata of the "running" status.
///
/// # Example
///
/// ```ignore
/// use homesense_bridge_framework::{BridgeRunner, run_bridge};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     run_bridge("mybridge", "mybridge.json5", async |runner: &mut BridgeRunner<MyBridgeConfig>| {
///         runner.spawn_eventloop_driver();
///         Ok(None)
///     })
///     .await
/// }
/// ```
pub async fn run_bridge<C, F>(
    name: &str,
    default_config: &'static str,
    setup: F,
) -> anyhow::Result<()>
where
    C: BridgeConfig,
    F: AsyncFnOnce(&mut BridgeRunner<C>) -> anyhow::Result<Option<serde_json::Value>>,
{
    let args = BridgeArgs::parse();
    let config_path = args.config_path(default_config);
    let config = C::resolve(config_path.as_deref(), &homesense_common::ProcessEnv)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let mut runner = BridgeRunner::new_with_args(name, config, Some(&args))
        .map_err(|e| anyhow::anyhow!("{}", e))?
        .with_status_publishing();

    if let Some(path) = &config_path {
        tracing::info!("Loaded configuration from {:?}", path);
    }

    let metadata = setup(&mut runner).await?;

    runner
        .run_with_metadata(metadata)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
}
