//! Position sources - asynchronous geolocation providers
//!
//! The correlator asks a `PositionSource` for a single position sample per
//! trigger. No timeout or retry is applied here; a failed request is simply
//! reported back and the capture attempt is abandoned.

use crate::domain::types::GeoPoint;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Why a position request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionError {
    /// The platform refused access to location services
    PermissionDenied,
    /// The platform could not determine a position
    PositionUnavailable,
    /// The platform gave up waiting for a position
    Timeout,
    /// No fix has been received yet
    NoFix,
    /// The latest fix is older than the configured maximum age
    Stale,
}

impl PositionError {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionError::PermissionDenied => "permission_denied",
            PositionError::PositionUnavailable => "position_unavailable",
            PositionError::Timeout => "timeout",
            PositionError::NoFix => "no_fix",
            PositionError::Stale => "stale",
        }
    }
}

impl std::str::FromStr for PositionError {
    type Err = std::convert::Infallible;

    /// Unknown reasons map to `PositionUnavailable`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "permission_denied" => PositionError::PermissionDenied,
            "timeout" => PositionError::Timeout,
            "no_fix" => PositionError::NoFix,
            "stale" => PositionError::Stale,
            _ => PositionError::PositionUnavailable,
        })
    }
}

impl std::fmt::Display for PositionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for PositionError {}

/// Asynchronous, single-shot provider of the current position
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn request_position(&self) -> Result<GeoPoint, PositionError>;
}

/// Latest state published by a position feed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixState {
    NoFix,
    Fix { point: GeoPoint, received_at: Instant },
    Lost(PositionError),
}

/// Publishing half of a position feed (e.g. a GPS receiver or the TCP listener)
#[derive(Debug)]
pub struct PositionFeed {
    tx: watch::Sender<FixState>,
}

impl PositionFeed {
    pub fn publish_fix(&self, point: GeoPoint) {
        self.tx.send_replace(FixState::Fix { point, received_at: Instant::now() });
    }

    pub fn publish_loss(&self, error: PositionError) {
        self.tx.send_replace(FixState::Lost(error));
    }
}

/// Answers each request with the most recent fix from a `PositionFeed`
pub struct LatestFixSource {
    rx: watch::Receiver<FixState>,
    /// Zero disables the age check
    max_fix_age: Duration,
}

impl LatestFixSource {
    pub fn current(&self) -> FixState {
        *self.rx.borrow()
    }
}

/// Create a position feed and the source reading from it
pub fn create_position_feed(max_fix_age: Duration) -> (PositionFeed, LatestFixSource) {
    let (tx, rx) = watch::channel(FixState::NoFix);
    (PositionFeed { tx }, LatestFixSource { rx, max_fix_age })
}

#[async_trait]
impl PositionSource for LatestFixSource {
    async fn request_position(&self) -> Result<GeoPoint, PositionError> {
        match self.current() {
            FixState::NoFix => Err(PositionError::NoFix),
            FixState::Lost(e) => Err(e),
            FixState::Fix { point, received_at } => {
                if !self.max_fix_age.is_zero() && received_at.elapsed() > self.max_fix_age {
                    Err(PositionError::Stale)
                } else {
                    Ok(point)
                }
            }
        }
    }
}

/// Replays a fixed script of position results, one per request
///
/// Used to replay a recorded capture session without a live feed, and as the
/// position source in correlator tests. Once the script is exhausted every
/// request fails with `PositionUnavailable`.
#[derive(Debug, Default)]
pub struct ScriptedPositionSource {
    script: Mutex<VecDeque<Result<GeoPoint, PositionError>>>,
    requests: Mutex<usize>,
}

impl ScriptedPositionSource {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Result<GeoPoint, PositionError>>,
    {
        Self { script: Mutex::new(script.into_iter().collect()), requests: Mutex::new(0) }
    }

    pub fn push(&self, result: Result<GeoPoint, PositionError>) {
        self.script.lock().push_back(result);
    }

    /// Number of requests served so far
    pub fn requests(&self) -> usize {
        *self.requests.lock()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl PositionSource for ScriptedPositionSource {
    async fn request_position(&self) -> Result<GeoPoint, PositionError> {
        *self.requests.lock() += 1;
        self.script.lock().pop_front().unwrap_or(Err(PositionError::PositionUnavailable))
    }
}

#[async_trait]
impl<T: PositionSource + ?Sized> PositionSource for std::sync::Arc<T> {
    async fn request_position(&self) -> Result<GeoPoint, PositionError> {
        (**self).request_position().await
    }
}
