//! Microbit heading service
//!
//! Receives Microbit event notifications and position fixes from an external
//! BLE bridge, captures an origin and a destination on two event codes, and
//! reports the distance and compass heading between them.
//!
//! Module structure:
//! - `domain/` - Core types, geodesy and compass rose
//! - `io/` - External interfaces (feed listener, position sources, sinks, GATT)
//! - `services/` - Event correlator
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use microbit_heading::infra::{Config, Metrics};
use microbit_heading::io::{
    create_position_feed, gatt, start_feed_listener, DisplaySink, FeedListenerConfig, JsonlSink,
    ResultSink,
};
use microbit_heading::services::EventCorrelator;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Microbit heading - distance and direction between two button presses
#[derive(Parser, Debug)]
#[command(name = "microbit-heading", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), git = env!("GIT_HASH"), "microbit-heading starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);
    let triggers = config.triggers();

    info!(
        config_file = %config.config_file(),
        origin_trigger = %triggers.origin,
        destination_trigger = %triggers.destination,
        name_filters = ?config.device_name_filters(),
        connect_timeout_ms = %config.connect_timeout().as_millis(),
        event_service = %gatt::EVENT_SERVICE,
        event_characteristic = %gatt::EVENT_CHARACTERISTIC,
        listener_port = %config.listener_port(),
        max_fix_age_ms = %config.max_fix_age().as_millis(),
        output_file = ?config.output_file(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Notification channel (bounded for backpressure)
    let (notification_tx, notification_rx) = mpsc::channel(256);
    let (position_feed, position_source) = create_position_feed(config.max_fix_age());
    let position_feed = Arc::new(position_feed);

    // Start feed listener
    let listener_config =
        FeedListenerConfig { port: config.listener_port(), enabled: config.listener_enabled() };
    let listener_metrics = metrics.clone();
    let listener_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_feed_listener(
            listener_config,
            notification_tx,
            position_feed,
            listener_metrics,
            listener_shutdown,
        )
        .await
        {
            tracing::error!(error = %e, "feed listener error");
        }
    });

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let mut sinks: Vec<Box<dyn ResultSink>> = vec![Box::new(DisplaySink)];
    if let Some(file) = config.output_file() {
        sinks.push(Box::new(JsonlSink::new(file)));
    }

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run correlator - consumes notifications until the channel closes or shutdown
    let mut correlator = EventCorrelator::new(triggers, position_source, sinks, metrics.clone());
    correlator.run(notification_rx, shutdown_rx).await;

    metrics.report().log();
    info!("microbit-heading shutdown complete");
    Ok(())
}
