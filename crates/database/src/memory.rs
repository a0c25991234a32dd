use crate::error::DbError;
use crate::store::{CheckStore, OutcomeFilter, OutcomeStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{CheckKey, CheckState, OutcomeRecord, ScheduledCheck, TrackedSignal};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct CheckTables {
    signals: HashMap<String, (TrackedSignal, Option<DateTime<Utc>>)>,
    checks: HashMap<CheckKey, ScheduledCheck>,
}

/// Process-local store for tests and for running without Postgres.
///
/// Signals and checks live behind one lock so `insert_signal` and
/// `cancel_signal` stay all-or-nothing.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    outcomes: RwLock<HashMap<CheckKey, OutcomeRecord>>,
    tables: RwLock<CheckTables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of a persisted check, if the check exists.
    pub async fn check_state(&self, key: &CheckKey) -> Option<CheckState> {
        self.tables.read().await.checks.get(key).map(|c| c.state)
    }

    pub async fn outcome_count(&self) -> usize {
        self.outcomes.read().await.len()
    }
}

#[async_trait]
impl OutcomeStore for InMemoryStore {
    async fn upsert_outcome(&self, record: &OutcomeRecord) -> Result<(), DbError> {
        let mut outcomes = self.outcomes.write().await;
        outcomes.insert(record.key(), record.clone());
        Ok(())
    }

    async fn get_outcome(&self, key: &CheckKey) -> Result<Option<OutcomeRecord>, DbError> {
        let outcomes = self.outcomes.read().await;
        Ok(outcomes.get(key).cloned())
    }

    async fn query_outcomes(&self, filter: &OutcomeFilter) -> Result<Vec<OutcomeRecord>, DbError> {
        let outcomes = self.outcomes.read().await;
        let mut matching: Vec<OutcomeRecord> = outcomes
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.checked_at
                .cmp(&b.checked_at)
                .then_with(|| a.key().cmp(&b.key()))
        });
        Ok(matching)
    }
}

#[async_trait]
impl CheckStore for InMemoryStore {
    async fn insert_signal(
        &self,
        signal: &TrackedSignal,
        checks: &[ScheduledCheck],
    ) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        if tables.signals.contains_key(&signal.id) {
            return Ok(false);
        }
        tables
            .signals
            .insert(signal.id.clone(), (signal.clone(), None));
        for check in checks {
            tables.checks.entry(check.key()).or_insert_with(|| check.clone());
        }
        Ok(true)
    }

    async fn set_check_state(&self, key: &CheckKey, state: CheckState) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        match tables.checks.get_mut(key) {
            Some(check) if !check.state.is_terminal() => {
                check.state = state;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn open_checks(&self) -> Result<Vec<(TrackedSignal, ScheduledCheck)>, DbError> {
        let tables = self.tables.read().await;
        let mut open: Vec<(TrackedSignal, ScheduledCheck)> = tables
            .checks
            .values()
            .filter(|check| !check.state.is_terminal())
            .filter_map(|check| match tables.signals.get(&check.signal_id) {
                Some((signal, None)) => Some((signal.clone(), check.clone())),
                _ => None,
            })
            .collect();
        open.sort_by(|a, b| a.1.fire_at.cmp(&b.1.fire_at));
        Ok(open)
    }

    async fn cancel_signal(&self, signal_id: &str) -> Result<usize, DbError> {
        let mut tables = self.tables.write().await;
        if let Some((_, cancelled_at)) = tables.signals.get_mut(signal_id) {
            cancelled_at.get_or_insert_with(Utc::now);
        }
        let mut cancelled = 0;
        for check in tables.checks.values_mut() {
            if check.signal_id == signal_id && check.state == CheckState::Pending {
                check.state = CheckState::Cancelled;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn cancelled_since(&self, since: DateTime<Utc>) -> Result<Vec<String>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .signals
            .iter()
            .filter(|(_, (_, cancelled_at))| cancelled_at.is_some_and(|at| at >= since))
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use core_types::{CheckInterval, Direction, Outcome, OutcomeThresholds};
    use rust_decimal_macros::dec;

    fn signal(id: &str) -> TrackedSignal {
        TrackedSignal {
            id: id.to_string(),
            symbol: "BTC".to_string(),
            direction: Direction::Long,
            entry_price: dec!(45000),
            entry_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            scanner_source: Some("momentum".to_string()),
            tier: Some("high".to_string()),
            unified_score: None,
        }
    }

    fn record(
        signal: &TrackedSignal,
        interval: CheckInterval,
        exit: rust_decimal::Decimal,
    ) -> OutcomeRecord {
        OutcomeRecord::evaluate(
            signal,
            interval,
            exit,
            &OutcomeThresholds::default(),
            signal.entry_time + interval.offset(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn upsert_replaces_record_for_same_key() {
        let store = InMemoryStore::new();
        let s = signal("s1");
        store.upsert_outcome(&record(&s, CheckInterval::OneHour, dec!(46000))).await.unwrap();
        store.upsert_outcome(&record(&s, CheckInterval::OneHour, dec!(48000))).await.unwrap();

        assert_eq!(store.outcome_count().await, 1);
        let stored = store
            .get_outcome(&CheckKey::new("s1", CheckInterval::OneHour))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.exit_price, dec!(48000));
        assert_eq!(stored.outcome, Outcome::Win);
    }

    #[tokio::test]
    async fn query_filters_by_window_and_interval() {
        let store = InMemoryStore::new();
        let s = signal("s1");
        for interval in [CheckInterval::OneHour, CheckInterval::FourHours, CheckInterval::OneDay] {
            store.upsert_outcome(&record(&s, interval, dec!(45500))).await.unwrap();
        }

        let since = s.entry_time + Duration::hours(2);
        let recent = store.query_outcomes(&OutcomeFilter::since(since)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].interval, CheckInterval::FourHours);

        let only_day = OutcomeFilter {
            interval: Some(CheckInterval::OneDay),
            ..OutcomeFilter::default()
        };
        assert_eq!(store.query_outcomes(&only_day).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_insert_of_same_signal_is_rejected() {
        let store = InMemoryStore::new();
        let s = signal("s1");
        assert!(store.insert_signal(&s, &s.checks()).await.unwrap());
        assert!(!store.insert_signal(&s, &s.checks()).await.unwrap());
        assert_eq!(store.open_checks().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn terminal_states_are_sticky() {
        let store = InMemoryStore::new();
        let s = signal("s1");
        store.insert_signal(&s, &s.checks()).await.unwrap();
        let key = CheckKey::new("s1", CheckInterval::OneHour);

        assert!(store.set_check_state(&key, CheckState::Fired).await.unwrap());
        assert!(store.set_check_state(&key, CheckState::Recorded).await.unwrap());
        assert!(!store.set_check_state(&key, CheckState::Fired).await.unwrap());
        assert_eq!(store.check_state(&key).await, Some(CheckState::Recorded));
        assert_eq!(store.open_checks().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn cancel_only_touches_pending_checks() {
        let store = InMemoryStore::new();
        let s = signal("s1");
        store.insert_signal(&s, &s.checks()).await.unwrap();
        let fired = CheckKey::new("s1", CheckInterval::OneHour);
        store.set_check_state(&fired, CheckState::Fired).await.unwrap();

        let before = Utc::now();
        assert_eq!(store.cancel_signal("s1").await.unwrap(), 4);
        assert_eq!(store.check_state(&fired).await, Some(CheckState::Fired));
        assert!(store.open_checks().await.unwrap().is_empty());
        assert_eq!(store.cancelled_since(before).await.unwrap(), vec!["s1".to_string()]);
    }
}
