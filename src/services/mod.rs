//! Services - business logic and state management
//!
//! - `correlator` - Origin/destination correlation state machine

pub mod correlator;

// Re-export commonly used types
pub use correlator::{CorrelationState, EventCorrelator, EventOutcome};
