pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{CheckInterval, CheckState, Direction, Outcome};
pub use error::CoreError;
pub use structs::{
    pnl_pct, CheckKey, OutcomeRecord, OutcomeThresholds, ScheduledCheck, SignalRequest,
    TrackedSignal,
};
