//! TCP feed listener for BLE notifications and position fixes
//!
//! An external BLE bridge and a GPS/geolocation provider push lines to this
//! listener. Protocol (one command per line):
//! - `NOTIFY <hex>`      event characteristic notification payload
//! - `FIX <lat> <lon>`   position fix in decimal degrees
//! - `NOFIX [reason]`    position lost (permission_denied, timeout, ...)

use crate::domain::types::{GeoPoint, Notification};
use crate::infra::metrics::Metrics;
use crate::io::position::{PositionError, PositionFeed};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Feed listener configuration
#[derive(Debug, Clone)]
pub struct FeedListenerConfig {
    pub port: u16,
    pub enabled: bool,
}

impl Default for FeedListenerConfig {
    fn default() -> Self {
        Self { port: 25804, enabled: true }
    }
}

/// A parsed feed line
#[derive(Debug, Clone, PartialEq)]
pub enum FeedLine {
    Notify(Vec<u8>),
    Fix(GeoPoint),
    NoFix(PositionError),
}

/// Parse a single feed line, returning a reason on failure
pub fn parse_feed_line(line: &str) -> Result<FeedLine, String> {
    let mut parts = line.split_whitespace();
    let command = parts.next().ok_or_else(|| "empty line".to_string())?;

    match command.to_ascii_uppercase().as_str() {
        "NOTIFY" => {
            let hex_str: String = parts.collect();
            if hex_str.is_empty() {
                return Err("missing payload".to_string());
            }
            hex::decode(&hex_str).map(FeedLine::Notify).map_err(|e| format!("bad hex: {}", e))
        }
        "FIX" => {
            let lat = parse_coordinate(parts.next(), "latitude", 90.0)?;
            let lon = parse_coordinate(parts.next(), "longitude", 180.0)?;
            Ok(FeedLine::Fix(GeoPoint::new(lat, lon)))
        }
        "NOFIX" => {
            let reason = parts.next().unwrap_or("position_unavailable");
            Ok(FeedLine::NoFix(reason.parse().unwrap_or(PositionError::PositionUnavailable)))
        }
        other => Err(format!("unknown command {}", other)),
    }
}

fn parse_coordinate(value: Option<&str>, name: &str, limit: f64) -> Result<f64, String> {
    let value = value.ok_or_else(|| format!("missing {}", name))?;
    let parsed: f64 = value.parse().map_err(|_| format!("bad {} {}", name, value))?;
    if !parsed.is_finite() || parsed.abs() > limit {
        return Err(format!("{} out of range: {}", name, parsed));
    }
    Ok(parsed)
}

/// Start the feed listener
///
/// Notifications are sent via try_send to avoid blocking - drops are counted in metrics.
/// Fixes are published to the shared position feed.
pub async fn start_feed_listener(
    config: FeedListenerConfig,
    notification_tx: mpsc::Sender<Notification>,
    position_feed: Arc<PositionFeed>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !config.enabled {
        info!("feed_listener_disabled");
        return Ok(());
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(port = %config.port, "feed_listener_started");
    serve(listener, notification_tx, position_feed, metrics, &mut shutdown).await;
    Ok(())
}

/// Accept loop over an already bound listener
pub async fn serve(
    listener: TcpListener,
    notification_tx: mpsc::Sender<Notification>,
    position_feed: Arc<PositionFeed>,
    metrics: Arc<Metrics>,
    shutdown: &mut watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("feed_listener_shutdown");
                    return;
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((socket, addr)) => {
                        let tx = notification_tx.clone();
                        let feed = position_feed.clone();
                        let m = metrics.clone();
                        tokio::spawn(async move {
                            handle_feed_connection(socket, addr, tx, feed, m).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "feed_listener_accept_failed");
                    }
                }
            }
        }
    }
}

async fn handle_feed_connection(
    socket: tokio::net::TcpStream,
    addr: SocketAddr,
    notification_tx: mpsc::Sender<Notification>,
    position_feed: Arc<PositionFeed>,
    metrics: Arc<Metrics>,
) {
    let peer = addr.to_string();
    debug!(peer = %peer, "feed_connection_accepted");

    let reader = BufReader::new(socket);
    let mut lines = reader.lines();

    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_feed_line(line) {
            Ok(FeedLine::Notify(payload)) => {
                match notification_tx.try_send(Notification::new(payload)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        metrics.record_notification_dropped();
                        // Rate-limit warning to 1 per second
                        if last_drop_warn.elapsed() > Duration::from_secs(1) {
                            warn!(peer = %peer, "notification_dropped: channel full");
                            last_drop_warn = Instant::now();
                        }
                    }
                    Err(TrySendError::Closed(_)) => {
                        warn!(peer = %peer, "notification_channel_closed");
                        break;
                    }
                }
            }
            Ok(FeedLine::Fix(point)) => {
                debug!(peer = %peer, lat = %point.latitude, lon = %point.longitude, "position_fix");
                position_feed.publish_fix(point);
            }
            Ok(FeedLine::NoFix(reason)) => {
                info!(peer = %peer, reason = %reason, "position_lost");
                position_feed.publish_loss(reason);
            }
            Err(reason) => {
                debug!(peer = %peer, line = %line, reason = %reason, "feed_unknown_message");
            }
        }
    }

    debug!(peer = %peer, "feed_connection_closed");
}
