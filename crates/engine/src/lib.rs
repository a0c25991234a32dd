//! The deferred outcome evaluation engine.
//!
//! A tracked signal gets five checks (1h, 4h, 24h, 7d, 30d after entry). The
//! `IntervalScheduler` fires each check when it comes due, the `EvaluationJob`
//! prices it through the `OutcomeEvaluator`, and the result lands in the
//! outcome store (or the fallback queue). `SignalTracker::resync` rebuilds the
//! schedule from the check store after a restart.

pub mod error;
pub mod evaluator;
pub mod job;
pub mod resync;
pub mod scheduler;
pub mod tracker;

pub use error::EngineError;
pub use evaluator::{Evaluation, OutcomeEvaluator, SkipReason};
pub use job::EvaluationJob;
pub use resync::ResyncTask;
pub use scheduler::{CheckHandler, CheckScheduler, IntervalScheduler};
pub use tracker::{ResyncSummary, SignalTracker, SignalValidator, TrackOutcome};
