use crate::error::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{CheckInterval, CheckKey, CheckState, OutcomeRecord, ScheduledCheck, TrackedSignal};

/// Selects outcome records. Every field left as `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct OutcomeFilter {
    /// Only records with `checked_at >= since`.
    pub since: Option<DateTime<Utc>>,
    pub signal_id: Option<String>,
    pub interval: Option<CheckInterval>,
}

impl OutcomeFilter {
    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &OutcomeRecord) -> bool {
        self.since.is_none_or(|since| record.checked_at >= since)
            && self
                .signal_id
                .as_deref()
                .is_none_or(|id| record.signal_id == id)
            && self.interval.is_none_or(|interval| record.interval == interval)
    }
}

/// Durable keyed storage for outcome records.
///
/// Implementations must accept concurrent upserts for different keys without
/// any locking by the caller, and a second upsert for the same key replaces
/// the first.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn upsert_outcome(&self, record: &OutcomeRecord) -> Result<(), DbError>;

    async fn get_outcome(&self, key: &CheckKey) -> Result<Option<OutcomeRecord>, DbError>;

    /// Returns matching records ordered by `checked_at`, oldest first.
    async fn query_outcomes(&self, filter: &OutcomeFilter) -> Result<Vec<OutcomeRecord>, DbError>;
}

/// Persistent bookkeeping for tracked signals and their scheduled checks.
#[async_trait]
pub trait CheckStore: Send + Sync {
    /// Stores a signal together with its checks, all or nothing.
    ///
    /// Returns `false` without writing anything when the signal id is already known.
    async fn insert_signal(
        &self,
        signal: &TrackedSignal,
        checks: &[ScheduledCheck],
    ) -> Result<bool, DbError>;

    /// Moves a check to `state`. Terminal states are sticky: returns `false`
    /// when the check is missing or already RECORDED, SKIPPED or CANCELLED.
    async fn set_check_state(&self, key: &CheckKey, state: CheckState) -> Result<bool, DbError>;

    /// Every PENDING or FIRED check of a non-cancelled signal, with its signal.
    async fn open_checks(&self) -> Result<Vec<(TrackedSignal, ScheduledCheck)>, DbError>;

    /// Marks the signal cancelled and its PENDING checks CANCELLED.
    /// Returns the number of checks cancelled.
    async fn cancel_signal(&self, signal_id: &str) -> Result<usize, DbError>;

    /// Ids of signals cancelled at or after `since`.
    async fn cancelled_since(&self, since: DateTime<Utc>) -> Result<Vec<String>, DbError>;
}

/// Append-only degraded storage used when the primary store rejects a write.
#[async_trait]
pub trait FallbackQueue: Send + Sync {
    async fn append(&self, record: &OutcomeRecord) -> Result<(), DbError>;
}

/// Where a persisted outcome ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistedTo {
    Primary,
    Fallback,
}

/// The single write path the evaluator uses for outcome records.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn persist(&self, record: &OutcomeRecord) -> Result<PersistedTo, DbError>;
}
