//! plex-presence - occupancy sensors driven by Plex playback webhooks
//!
//! Module structure:
//! - `domain/` - Playback event model and webhook decoding
//! - `io/` - External interfaces (webhook listener, MQTT bridge, registry)
//! - `services/` - Decision logic (rules, presence aggregation, dispatch)
//! - `infra/` - Infrastructure (config, metrics, embedded broker)

use clap::Parser;
use plex_presence::infra::{Config, Metrics};
use plex_presence::io::{create_bridge_channel, BridgeSender, MqttBridge, Registry};
use plex_presence::services::{DispatchMsg, Dispatcher};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// plex-presence - Plex webhook to occupancy sensor bridge
#[derive(Parser, Debug)]
#[command(name = "plex-presence", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Config must load before logging init: `debug = true` raises the
    // default filter. RUST_LOG still wins when set.
    let config = Config::from_file(&args.config)?;

    let default_filter = if config.debug() { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("plex-presence starting");

    // Start embedded MQTT broker if enabled
    plex_presence::infra::broker::start_embedded_broker(&config);

    info!(
        config_file = %config.config_file(),
        port = %config.port(),
        delay_off_ms = %config.delay_off_ms(),
        sensors = %config.sensors().len(),
        mqtt_enabled = %config.mqtt_enabled(),
        mqtt_host = %config.mqtt_host(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());
    let sensor_names: Vec<String> =
        config.sensors().iter().map(|s| s.name.clone()).collect();
    metrics.set_sensors(&sensor_names);

    // MQTT bridge publisher (if enabled)
    let bridge: Option<BridgeSender> = if config.mqtt_enabled() {
        let (bridge_tx, bridge_rx) = create_bridge_channel(256);
        let publisher = MqttBridge::new(&config, bridge_rx);
        let publisher_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });
        Some(bridge_tx)
    } else {
        None
    };

    // Reconcile configured sensors against previous runs; clear the
    // published state of sensors that were dropped from config
    let registry = Registry::new(config.registry_file());
    let diff = registry.reconcile(&sensor_names)?;
    for name in &diff.added {
        info!(sensor = %name, "sensor_added");
    }
    for name in &diff.removed {
        info!(sensor = %name, "sensor_removed_from_config");
        if let Some(ref bridge) = bridge {
            bridge.send_remove(name);
        }
    }

    // Dispatch queue: webhook bodies and off-timer expirations share one
    // serialized channel
    let (event_tx, event_rx) = mpsc::channel::<DispatchMsg>(1024);

    let mut dispatcher = Dispatcher::new(&config, bridge, metrics.clone(), event_tx.clone());
    dispatcher.publish_initial_state();

    // Start webhook listener
    let webhook_port = config.port();
    let webhook_tx = event_tx;
    let webhook_metrics = metrics.clone();
    let webhook_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = plex_presence::io::webhook::start_webhook_listener(
            webhook_port,
            webhook_tx,
            webhook_metrics,
            webhook_shutdown,
        )
        .await
        {
            tracing::error!(error = %e, "webhook_listener_error");
        }
    });

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = plex_presence::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "prometheus_metrics_server_error");
            }
        });
    }

    // Periodic metrics summary in the log
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        interval.tick().await; // skip the immediate first tick
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    info!("dispatcher_started");

    // Run dispatcher - consumes events until shutdown
    dispatcher.run(event_rx, shutdown_rx).await;

    info!("plex-presence shutdown complete");
    Ok(())
}
