//! Result sinks - where computed headings are delivered
//!
//! - `DisplaySink` logs the two display strings
//! - `JsonlSink` appends one JSON record per result to a file
//! - `ChannelSink` forwards results to another task (UI, tests)

use crate::domain::heading::HeadingResult;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

/// Consumer of heading results
pub trait ResultSink: Send {
    fn emit(&mut self, result: &HeadingResult);
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn emit(&mut self, result: &HeadingResult) {
        (**self).emit(result);
    }
}

/// Delivers every result to each sink in order
impl<S: ResultSink> ResultSink for Vec<S> {
    fn emit(&mut self, result: &HeadingResult) {
        for sink in self.iter_mut() {
            sink.emit(result);
        }
    }
}

/// Logs the distance and heading display strings
#[derive(Debug, Default)]
pub struct DisplaySink;

impl ResultSink for DisplaySink {
    fn emit(&mut self, result: &HeadingResult) {
        info!(
            cycle_id = %result.cycle_id,
            distance = %result.distance_text(),
            heading = %result.heading_text(),
            "heading_displayed"
        );
    }
}

/// Writes results in JSONL format (one JSON object per line)
pub struct JsonlSink {
    file_path: String,
}

impl JsonlSink {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "result_egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a result to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_result(&self, result: &HeadingResult) -> bool {
        match self.append_line(&result.to_json()) {
            Ok(()) => true,
            Err(e) => {
                error!(cycle_id = %result.cycle_id, error = %e, "result_egress_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "result_egress_written");

        Ok(())
    }
}

impl ResultSink for JsonlSink {
    fn emit(&mut self, result: &HeadingResult) {
        self.write_result(result);
    }
}

/// Forwards results over a bounded channel without blocking the correlator
pub struct ChannelSink {
    tx: mpsc::Sender<HeadingResult>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<HeadingResult>) -> Self {
        Self { tx }
    }
}

/// Create a channel sink and the receiver for its results
pub fn create_result_channel(buffer_size: usize) -> (ChannelSink, mpsc::Receiver<HeadingResult>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (ChannelSink::new(tx), rx)
}

impl ResultSink for ChannelSink {
    fn emit(&mut self, result: &HeadingResult) {
        match self.tx.try_send(result.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(cycle_id = %result.cycle_id, "result_dropped: channel full");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(cycle_id = %result.cycle_id, "result_channel_closed");
            }
        }
    }
}
