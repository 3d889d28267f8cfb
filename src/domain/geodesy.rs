//! Great-circle geometry on a spherical Earth
//!
//! Haversine distance and initial bearing between two points. This is the
//! standard spherical approximation, not an ellipsoidal geodesic.

use crate::domain::types::GeoPoint;
use std::f64::consts::PI;

/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[inline]
pub fn to_radians(degrees: f64) -> f64 {
    degrees * PI / 180.0
}

#[inline]
pub fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / PI
}

/// Great-circle distance between two points in metres
pub fn haversine_distance(p1: GeoPoint, p2: GeoPoint) -> f64 {
    let phi1 = to_radians(p1.latitude);
    let phi2 = to_radians(p2.latitude);
    let d_phi = to_radians(p2.latitude - p1.latitude);
    let d_lambda = to_radians(p2.longitude - p1.longitude);

    let sin_dphi_2 = (d_phi / 2.0).sin();
    let sin_dlambda_2 = (d_lambda / 2.0).sin();
    let a = sin_dphi_2 * sin_dphi_2 + phi1.cos() * phi2.cos() * sin_dlambda_2 * sin_dlambda_2;
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing from `p1` towards `p2`, degrees clockwise from North in [0, 360)
pub fn initial_bearing(p1: GeoPoint, p2: GeoPoint) -> f64 {
    let d_lambda = to_radians(p2.longitude - p1.longitude);
    let phi1 = to_radians(p1.latitude);
    let phi2 = to_radians(p2.latitude);

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();

    let bearing = (to_degrees(y.atan2(x)) + 360.0) % 360.0;
    // -tiny + 360.0 rounds to exactly 360.0
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}
