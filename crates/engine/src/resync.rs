use crate::tracker::SignalTracker;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info};

/// Periodically reconciles the in-memory scheduler with the check store.
///
/// This picks up signals registered by other processes (the `track` CLI
/// command) and cancellations issued out-of-process. It runs next to the
/// scheduler loop for as long as the daemon is alive.
pub struct ResyncTask {
    tracker: Arc<SignalTracker>,
    every: Duration,
}

impl ResyncTask {
    pub fn new(tracker: Arc<SignalTracker>, every: Duration) -> Self {
        Self { tracker, every }
    }

    /// Spawns the loop. The startup resync is expected to have run already,
    /// so the first pass happens one period from now.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.start())
    }

    pub async fn start(self) {
        info!(every = ?self.every, "Starting periodic resync task");
        let mut timer = interval(self.every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        timer.tick().await;

        loop {
            timer.tick().await;
            match self.tracker.resync().await {
                Ok(summary) => info!(
                    open_checks = summary.rescheduled,
                    cancelled_signals = summary.cancelled_signals,
                    "Resync complete"
                ),
                // A failed pass is retried on the next tick.
                Err(e) => error!(error = %e, "Resync failed"),
            }
        }
    }
}
