use crate::evaluator::{Evaluation, OutcomeEvaluator};
use crate::scheduler::CheckHandler;
use async_trait::async_trait;
use core_types::{CheckKey, CheckState, ScheduledCheck, TrackedSignal};
use database::{CheckStore, PersistedTo};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// The scheduler's handler: runs one evaluation and keeps the persisted check state in step.
///
/// State writes are best effort and bounded by `write_timeout`. A failed or
/// timed-out write is logged and the in-memory result still stands; the next
/// resync may re-fire a check whose state never reached the store, which only
/// overwrites its outcome record.
pub struct EvaluationJob {
    evaluator: Arc<OutcomeEvaluator>,
    checks: Arc<dyn CheckStore>,
    write_timeout: Duration,
}

impl EvaluationJob {
    pub fn new(
        evaluator: Arc<OutcomeEvaluator>,
        checks: Arc<dyn CheckStore>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            evaluator,
            checks,
            write_timeout,
        }
    }

    async fn mark(&self, key: &CheckKey, state: CheckState) -> Option<bool> {
        let write = self.checks.set_check_state(key, state);
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(updated)) => Some(updated),
            Ok(Err(e)) => {
                warn!(
                    signal_id = %key.signal_id,
                    interval = %key.interval,
                    %state,
                    error = %e,
                    "Failed to persist check state"
                );
                None
            }
            Err(_) => {
                warn!(
                    signal_id = %key.signal_id,
                    interval = %key.interval,
                    %state,
                    timeout = ?self.write_timeout,
                    "Check state write timed out"
                );
                None
            }
        }
    }
}

#[async_trait]
impl CheckHandler for EvaluationJob {
    async fn run(&self, signal: Arc<TrackedSignal>, check: ScheduledCheck) -> CheckState {
        let key = check.key();

        // `false` means the store already closed this check, typically a
        // cancellation issued from another process since the last resync.
        if self.mark(&key, CheckState::Fired).await == Some(false) {
            info!(
                signal_id = %key.signal_id,
                interval = %key.interval,
                "Check already closed in store, not evaluating"
            );
            return CheckState::Cancelled;
        }

        let evaluator = self.evaluator.clone();
        let interval = check.interval;
        let target = signal.clone();
        let result =
            tokio::spawn(async move { evaluator.evaluate(&target, interval).await }).await;

        let state = match result {
            Ok(Ok(Evaluation::Recorded(record, persisted_to))) => {
                info!(
                    signal_id = %record.signal_id,
                    symbol = %record.symbol,
                    interval = %record.interval,
                    outcome = %record.outcome,
                    pnl_pct = %record.pnl_pct.round_dp(2),
                    fallback = persisted_to == PersistedTo::Fallback,
                    "Outcome recorded"
                );
                CheckState::Recorded
            }
            Ok(Ok(Evaluation::Skipped(reason))) => {
                warn!(
                    signal_id = %key.signal_id,
                    interval = %key.interval,
                    %reason,
                    "Check skipped"
                );
                CheckState::Skipped
            }
            Ok(Err(e)) => {
                error!(
                    signal_id = %key.signal_id,
                    interval = %key.interval,
                    error = %e,
                    "Evaluation failed"
                );
                CheckState::Skipped
            }
            Err(e) => {
                error!(
                    signal_id = %key.signal_id,
                    interval = %key.interval,
                    error = %e,
                    "Evaluation panicked"
                );
                CheckState::Skipped
            }
        };

        self.mark(&key, state).await;
        state
    }
}
