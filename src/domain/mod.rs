//! Domain models - geodesy, compass rose and core types
//!
//! This module contains the canonical data types used throughout the system:
//! - `GeoPoint` - a latitude/longitude capture
//! - `EventCode` - firmware event code carried by a BLE notification
//! - `CompassPoint` - 16-wind classification of a bearing
//! - `HeadingResult` - distance and direction at the end of a cycle

pub mod compass;
pub mod geodesy;
pub mod heading;
pub mod types;

// Re-export commonly used types at module level
pub use compass::CompassPoint;
pub use heading::HeadingResult;
pub use types::{EventCode, GeoPoint, Notification, TriggerKind, Triggers};
