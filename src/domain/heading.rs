//! Heading result computed at the end of a correlation cycle

use crate::domain::compass::CompassPoint;
use crate::domain::geodesy::{haversine_distance, initial_bearing};
use crate::domain::types::GeoPoint;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Distance and direction from an origin capture to a destination capture
#[derive(Debug, Clone, Serialize)]
pub struct HeadingResult {
    /// Cycle ID (UUIDv7)
    pub cycle_id: String,
    /// When the result was computed (epoch ms)
    pub computed_at: u64,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    /// Great-circle distance in metres
    pub distance_m: f64,
    /// Initial bearing in degrees, absent when the points coincide
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compass: Option<CompassPoint>,
}

impl HeadingResult {
    /// Compute distance, and bearing only when the points are apart
    pub fn compute(origin: GeoPoint, destination: GeoPoint) -> Self {
        let distance_m = haversine_distance(origin, destination);
        let (bearing_deg, compass) = if distance_m > 0.0 {
            let bearing = initial_bearing(origin, destination);
            (Some(bearing), Some(CompassPoint::classify(bearing)))
        } else {
            (None, None)
        };

        Self {
            cycle_id: new_uuid_v7(),
            computed_at: epoch_ms(),
            origin,
            destination,
            distance_m,
            bearing_deg,
            compass,
        }
    }

    /// Distance display string, e.g. "111194.93 m"
    pub fn distance_text(&self) -> String {
        format!("{:.2} m", self.distance_m)
    }

    /// Heading display string, e.g. "Heading to: E east" or "Heading to: nowhere"
    pub fn heading_text(&self) -> String {
        match self.compass {
            Some(point) => format!("Heading to: {}", point),
            None => "Heading to: nowhere".to_string(),
        }
    }

    /// Serialize to a JSON record including the display strings
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct Record<'a> {
            #[serde(flatten)]
            result: &'a HeadingResult,
            distance: String,
            heading: String,
        }

        let record =
            Record { result: self, distance: self.distance_text(), heading: self.heading_text() };
        serde_json::to_string(&record).unwrap_or_else(|_| "{}".to_string())
    }
}
