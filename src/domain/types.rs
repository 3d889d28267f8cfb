//! Shared types for the heading service

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Event code raised by the Microbit when button A is held (origin capture)
pub const ORIGIN_TRIGGER: u16 = 88;

/// Event code raised by the Microbit when button B is held (destination capture)
pub const DESTINATION_TRIGGER: u16 = 89;

/// Byte offset of the event code inside an event characteristic notification
const EVENT_CODE_OFFSET: usize = 2;

/// A geolocation sample in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    #[inline]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.latitude, self.longitude)
    }
}

/// Newtype wrapper for firmware event codes to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EventCode(pub u16);

impl EventCode {
    /// Extract the event code from a notification payload.
    ///
    /// The code is an unsigned little-endian u16 at byte offset 2.
    /// Returns `None` when the payload is too short to hold one.
    pub fn from_notification(payload: &[u8]) -> Option<Self> {
        let bytes = payload.get(EVENT_CODE_OFFSET..EVENT_CODE_OFFSET + 2)?;
        Some(Self(u16::from_le_bytes([bytes[0], bytes[1]])))
    }
}

impl std::fmt::Display for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The pair of event codes that drive a correlation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triggers {
    pub origin: EventCode,
    pub destination: EventCode,
}

impl Default for Triggers {
    fn default() -> Self {
        Self { origin: EventCode(ORIGIN_TRIGGER), destination: EventCode(DESTINATION_TRIGGER) }
    }
}

/// Classification of an incoming event code against the configured triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Origin,
    Destination,
    Unrecognized,
}

impl Triggers {
    #[inline]
    pub fn classify(&self, code: EventCode) -> TriggerKind {
        if code == self.origin {
            TriggerKind::Origin
        } else if code == self.destination {
            TriggerKind::Destination
        } else {
            TriggerKind::Unrecognized
        }
    }
}

/// A BLE notification received from the event characteristic
#[derive(Debug, Clone)]
pub struct Notification {
    pub payload: Vec<u8>,
    pub received_at: Instant,
}

impl Notification {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload, received_at: Instant::now() }
    }

    #[inline]
    pub fn event_code(&self) -> Option<EventCode> {
        EventCode::from_notification(&self.payload)
    }
}
