//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `gatt` - Microbit GATT constants and characteristic payload helpers
//! - `listener` - TCP feed for BLE notifications and position fixes
//! - `position` - Position sources (latest fix, scripted)
//! - `sink` - Result sinks (display log, JSONL file, channel)

pub mod gatt;
pub mod listener;
pub mod position;
pub mod sink;

// Re-export commonly used types
pub use listener::{start_feed_listener, FeedListenerConfig};
pub use position::{
    create_position_feed, LatestFixSource, PositionError, PositionFeed, PositionSource,
    ScriptedPositionSource,
};
pub use sink::{create_result_channel, ChannelSink, DisplaySink, JsonlSink, ResultSink};
