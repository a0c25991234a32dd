use crate::error::DbError;
use crate::store::{FallbackQueue, OutcomeStore, PersistedTo, PersistenceSink};
use async_trait::async_trait;
use core_types::OutcomeRecord;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::error;

/// Fallback queue backed by an append-only JSON lines file.
///
/// Appends are serialised through a mutex so concurrent evaluations never
/// interleave partial lines. Nothing replays the file automatically.
#[derive(Debug)]
pub struct FileFallbackQueue {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileFallbackQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every queued record back. A missing file is an empty queue.
    pub async fn read_all(&self) -> Result<Vec<OutcomeRecord>, DbError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<OutcomeRecord>(line).map_err(DbError::from))
            .collect()
    }
}

#[async_trait]
impl FallbackQueue for FileFallbackQueue {
    async fn append(&self, record: &OutcomeRecord) -> Result<(), DbError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Writes to the primary store and degrades to the fallback queue when the
/// primary errors or does not answer within `write_timeout`.
///
/// Each record reaches the fallback at most once per `persist` call; only a
/// failure of both destinations is returned as an error.
pub struct FailoverSink {
    primary: Arc<dyn OutcomeStore>,
    fallback: Arc<dyn FallbackQueue>,
    write_timeout: Duration,
}

impl FailoverSink {
    pub fn new(
        primary: Arc<dyn OutcomeStore>,
        fallback: Arc<dyn FallbackQueue>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            write_timeout,
        }
    }
}

#[async_trait]
impl PersistenceSink for FailoverSink {
    async fn persist(&self, record: &OutcomeRecord) -> Result<PersistedTo, DbError> {
        let write = self.primary.upsert_outcome(record);
        let failure = match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => return Ok(PersistedTo::Primary),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("primary write timed out after {:?}", self.write_timeout),
        };

        error!(
            signal_id = %record.signal_id,
            interval = %record.interval,
            reason = %failure,
            "Primary outcome store failed, writing record to fallback queue"
        );

        self.fallback.append(record).await.map_err(|e| {
            error!(
                signal_id = %record.signal_id,
                interval = %record.interval,
                error = %e,
                "Fallback queue append failed, outcome record lost"
            );
            e
        })?;
        Ok(PersistedTo::Fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::store::OutcomeFilter;
    use chrono::{TimeZone, Utc};
    use core_types::{CheckInterval, CheckKey, Direction, OutcomeThresholds, TrackedSignal};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingStore {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl OutcomeStore for FailingStore {
        async fn upsert_outcome(&self, _record: &OutcomeRecord) -> Result<(), DbError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(DbError::Decode("primary unavailable".to_string()))
        }

        async fn get_outcome(&self, _key: &CheckKey) -> Result<Option<OutcomeRecord>, DbError> {
            Ok(None)
        }

        async fn query_outcomes(
            &self,
            _filter: &OutcomeFilter,
        ) -> Result<Vec<OutcomeRecord>, DbError> {
            Ok(Vec::new())
        }
    }

    struct StalledStore;

    #[async_trait]
    impl OutcomeStore for StalledStore {
        async fn upsert_outcome(&self, _record: &OutcomeRecord) -> Result<(), DbError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn get_outcome(&self, _key: &CheckKey) -> Result<Option<OutcomeRecord>, DbError> {
            Ok(None)
        }

        async fn query_outcomes(
            &self,
            _filter: &OutcomeFilter,
        ) -> Result<Vec<OutcomeRecord>, DbError> {
            Ok(Vec::new())
        }
    }

    fn temp_queue() -> Arc<FileFallbackQueue> {
        let path = std::env::temp_dir()
            .join(format!("hindsight-fallback-{}", uuid::Uuid::new_v4()))
            .join("outcomes.jsonl");
        Arc::new(FileFallbackQueue::new(path))
    }

    fn record() -> OutcomeRecord {
        let signal = TrackedSignal {
            id: "s1".to_string(),
            symbol: "BTC".to_string(),
            direction: Direction::Long,
            entry_price: dec!(45000),
            entry_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            scanner_source: None,
            tier: None,
            unified_score: None,
        };
        OutcomeRecord::evaluate(
            &signal,
            CheckInterval::OneHour,
            dec!(46500),
            &OutcomeThresholds::default(),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn healthy_primary_keeps_fallback_empty() {
        let primary = Arc::new(InMemoryStore::new());
        let queue = temp_queue();
        let sink = FailoverSink::new(primary.clone(), queue.clone(), Duration::from_secs(1));

        assert_eq!(sink.persist(&record()).await.unwrap(), PersistedTo::Primary);
        assert_eq!(primary.outcome_count().await, 1);
        assert!(queue.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_primary_enqueues_record_exactly_once() {
        let primary = Arc::new(FailingStore { attempts: AtomicUsize::new(0) });
        let queue = temp_queue();
        let sink = FailoverSink::new(primary.clone(), queue.clone(), Duration::from_secs(1));

        let outcome = record();
        assert_eq!(sink.persist(&outcome).await.unwrap(), PersistedTo::Fallback);
        assert_eq!(primary.attempts.load(Ordering::SeqCst), 1);

        let queued = queue.read_all().await.unwrap();
        assert_eq!(queued, vec![outcome]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_primary_times_out_into_fallback() {
        let queue = temp_queue();
        let sink = FailoverSink::new(Arc::new(StalledStore), queue.clone(), Duration::from_secs(5));

        assert_eq!(sink.persist(&record()).await.unwrap(), PersistedTo::Fallback);
        assert_eq!(queue.read_all().await.unwrap().len(), 1);
    }
}
