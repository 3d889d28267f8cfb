//! Sixteen-wind compass rose

use serde::Serialize;

/// One of the 16 compass points, ordered clockwise from North
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompassPoint {
    N,
    NNE,
    NE,
    ENE,
    E,
    ESE,
    SE,
    SSE,
    S,
    SSW,
    SW,
    WSW,
    W,
    WNW,
    NW,
    NNW,
}

/// All points in clockwise order; index i covers bearings around i * 22.5 degrees
pub const COMPASS_POINTS: [CompassPoint; 16] = [
    CompassPoint::N,
    CompassPoint::NNE,
    CompassPoint::NE,
    CompassPoint::ENE,
    CompassPoint::E,
    CompassPoint::ESE,
    CompassPoint::SE,
    CompassPoint::SSE,
    CompassPoint::S,
    CompassPoint::SSW,
    CompassPoint::SW,
    CompassPoint::WSW,
    CompassPoint::W,
    CompassPoint::WNW,
    CompassPoint::NW,
    CompassPoint::NNW,
];

impl CompassPoint {
    /// Classify a bearing in degrees.
    ///
    /// `round(bearing * 16 / 360) mod 16`, using `f64::round` which rounds
    /// half away from zero: 11.25 maps to NNE, 33.75 to NE. Any finite input
    /// is accepted; negative bearings and bearings past 360 wrap.
    pub fn classify(bearing_degrees: f64) -> Self {
        if !bearing_degrees.is_finite() {
            return CompassPoint::N;
        }
        let index = (bearing_degrees * 16.0 / 360.0).round().rem_euclid(16.0) as usize;
        // rem_euclid can return 16.0 for tiny negative inputs
        COMPASS_POINTS[index % 16]
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            CompassPoint::N => "N",
            CompassPoint::NNE => "NNE",
            CompassPoint::NE => "NE",
            CompassPoint::ENE => "ENE",
            CompassPoint::E => "E",
            CompassPoint::ESE => "ESE",
            CompassPoint::SE => "SE",
            CompassPoint::SSE => "SSE",
            CompassPoint::S => "S",
            CompassPoint::SSW => "SSW",
            CompassPoint::SW => "SW",
            CompassPoint::WSW => "WSW",
            CompassPoint::W => "W",
            CompassPoint::WNW => "WNW",
            CompassPoint::NW => "NW",
            CompassPoint::NNW => "NNW",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompassPoint::N => "north",
            CompassPoint::NNE => "north-northeast",
            CompassPoint::NE => "north-east",
            CompassPoint::ENE => "east-northeast",
            CompassPoint::E => "east",
            CompassPoint::ESE => "east-southeast",
            CompassPoint::SE => "south-east",
            CompassPoint::SSE => "south-southeast",
            CompassPoint::S => "south",
            CompassPoint::SSW => "south-southwest",
            CompassPoint::SW => "south-west",
            CompassPoint::WSW => "west-southwest",
            CompassPoint::W => "west",
            CompassPoint::WNW => "west-northwest",
            CompassPoint::NW => "north-west",
            CompassPoint::NNW => "north-northwest",
        }
    }
}

/// Display label, e.g. "E east"
impl std::fmt::Display for CompassPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.abbreviation(), self.name())
    }
}
