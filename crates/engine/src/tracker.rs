use crate::error::EngineError;
use crate::scheduler::CheckScheduler;
use chrono::{DateTime, Duration, Utc};
use configuration::SignalSettings;
use core_types::{Direction, SignalRequest, TrackedSignal};
use database::CheckStore;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Validates and normalises raw signal requests.
///
/// Validation is pure: a rejected request leaves no trace anywhere.
#[derive(Debug, Clone)]
pub struct SignalValidator {
    scanner_sources: HashSet<String>,
    tiers: HashSet<String>,
    max_entry_time_skew: Duration,
}

impl SignalValidator {
    pub fn new(settings: &SignalSettings) -> Self {
        let normalise = |values: &[String]| {
            values
                .iter()
                .map(|v| v.trim().to_ascii_lowercase())
                .filter(|v| !v.is_empty())
                .collect::<HashSet<String>>()
        };
        Self {
            scanner_sources: normalise(&settings.scanner_sources),
            tiers: normalise(&settings.tiers),
            max_entry_time_skew: Duration::seconds(settings.max_entry_time_skew_secs.max(0)),
        }
    }

    pub fn validate(
        &self,
        request: &SignalRequest,
        now: DateTime<Utc>,
    ) -> Result<TrackedSignal, EngineError> {
        let symbol = request.symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(EngineError::invalid("symbol", "must not be empty"));
        }
        if symbol.chars().any(char::is_whitespace) {
            return Err(EngineError::invalid(
                "symbol",
                format!("'{}' contains whitespace", symbol),
            ));
        }

        if request.entry_price <= Decimal::ZERO {
            return Err(EngineError::invalid(
                "entry_price",
                format!("must be positive, got {}", request.entry_price),
            ));
        }

        let direction: Direction = request
            .direction
            .parse()
            .map_err(|_| {
                EngineError::invalid(
                    "direction",
                    format!("'{}' is not LONG or SHORT", request.direction),
                )
            })?;

        let entry_time = request.entry_time.unwrap_or(now);
        if entry_time > now + self.max_entry_time_skew {
            return Err(EngineError::invalid(
                "entry_time",
                format!("{} lies in the future", entry_time.to_rfc3339()),
            ));
        }

        let id = match request.id.as_deref().map(str::trim) {
            Some("") => return Err(EngineError::invalid("id", "must not be empty when supplied")),
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let scanner_source = Self::metadata(
            "scanner_source",
            request.scanner_source.as_deref(),
            &self.scanner_sources,
        )?;
        let tier = Self::metadata("tier", request.tier.as_deref(), &self.tiers)?;

        Ok(TrackedSignal {
            id,
            symbol,
            direction,
            entry_price: request.entry_price,
            entry_time,
            scanner_source,
            tier,
            unified_score: request.unified_score,
        })
    }

    fn metadata(
        field: &'static str,
        value: Option<&str>,
        known: &HashSet<String>,
    ) -> Result<Option<String>, EngineError> {
        let Some(value) = value.map(|v| v.trim().to_ascii_lowercase()) else {
            return Ok(None);
        };
        if value.is_empty() {
            return Ok(None);
        }
        if !known.is_empty() && !known.contains(&value) {
            return Err(EngineError::invalid(field, format!("'{}' is not a known value", value)));
        }
        Ok(Some(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    /// A new signal; its five checks are scheduled.
    Tracked(TrackedSignal),
    /// The id is already tracked. Nothing was changed.
    AlreadyTracked(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncSummary {
    pub rescheduled: usize,
    pub cancelled_signals: usize,
}

/// Entry point for signal intake and cancellation, and for restart recovery.
pub struct SignalTracker {
    validator: SignalValidator,
    checks: Arc<dyn CheckStore>,
    scheduler: Arc<dyn CheckScheduler>,
    last_resync: Mutex<Option<DateTime<Utc>>>,
}

impl SignalTracker {
    pub fn new(
        validator: SignalValidator,
        checks: Arc<dyn CheckStore>,
        scheduler: Arc<dyn CheckScheduler>,
    ) -> Self {
        Self {
            validator,
            checks,
            scheduler,
            last_resync: Mutex::new(None),
        }
    }

    pub fn validator(&self) -> &SignalValidator {
        &self.validator
    }

    /// Validates the request, persists the signal with its checks in one
    /// transaction, then hands the checks to the scheduler.
    pub async fn track(&self, request: SignalRequest) -> Result<TrackOutcome, EngineError> {
        let signal = self.validator.validate(&request, Utc::now())?;
        let checks = signal.checks();

        if !self.checks.insert_signal(&signal, &checks).await? {
            debug!(signal_id = %signal.id, "Signal already tracked");
            return Ok(TrackOutcome::AlreadyTracked(signal.id));
        }

        let shared = Arc::new(signal.clone());
        for check in checks {
            self.scheduler.schedule(shared.clone(), check).await;
        }
        info!(
            signal_id = %signal.id,
            symbol = %signal.symbol,
            direction = %signal.direction,
            entry_price = %signal.entry_price,
            "Tracking signal"
        );
        Ok(TrackOutcome::Tracked(signal))
    }

    /// Cancels every check of the signal that has not fired yet.
    /// In-flight evaluations are not interrupted.
    pub async fn cancel(&self, signal_id: &str) -> Result<usize, EngineError> {
        let dropped = self.scheduler.cancel_signal(signal_id).await;
        let persisted = self.checks.cancel_signal(signal_id).await?;
        info!(signal_id, dropped, persisted, "Signal cancelled");
        Ok(dropped.max(persisted))
    }

    /// Brings the scheduler in line with the store.
    ///
    /// Open checks are (re-)registered, signals cancelled by other processes
    /// since the previous resync are dropped, then finished bookkeeping is
    /// pruned. Registration is idempotent, so running this repeatedly is safe.
    pub async fn resync(&self) -> Result<ResyncSummary, EngineError> {
        let started = Utc::now();
        let mut last_resync = self.last_resync.lock().await;

        let open = self.checks.open_checks().await?;
        let rescheduled = open.len();
        let mut signals: HashMap<String, Arc<TrackedSignal>> = HashMap::new();
        for (signal, check) in open {
            let shared = signals
                .entry(signal.id.clone())
                .or_insert_with(|| Arc::new(signal))
                .clone();
            self.scheduler.schedule(shared, check).await;
        }

        let mut cancelled_signals = 0;
        if let Some(since) = *last_resync {
            for signal_id in self.checks.cancelled_since(since).await? {
                if self.scheduler.cancel_signal(&signal_id).await > 0 {
                    cancelled_signals += 1;
                }
            }
        }

        self.scheduler.prune_completed().await;
        *last_resync = Some(started);

        let summary = ResyncSummary {
            rescheduled,
            cancelled_signals,
        };
        debug!(?summary, "Resync complete");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_types::{CheckInterval, CheckKey, CheckState, ScheduledCheck};
    use database::InMemoryStore;
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingScheduler {
        scheduled: StdMutex<Vec<CheckKey>>,
        cancelled: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl CheckScheduler for RecordingScheduler {
        async fn schedule(&self, _signal: Arc<TrackedSignal>, check: ScheduledCheck) {
            self.scheduled.lock().unwrap().push(check.key());
        }

        async fn cancel_signal(&self, signal_id: &str) -> usize {
            self.cancelled.lock().unwrap().push(signal_id.to_string());
            let scheduled = self.scheduled.lock().unwrap();
            scheduled.iter().filter(|k| k.signal_id == signal_id).count()
        }
    }

    fn settings() -> SignalSettings {
        SignalSettings {
            scanner_sources: vec!["momentum".to_string(), "breakout".to_string()],
            tiers: vec!["high".to_string(), "medium".to_string(), "low".to_string()],
            max_entry_time_skew_secs: 300,
        }
    }

    fn request() -> SignalRequest {
        SignalRequest {
            id: Some("s1".to_string()),
            symbol: " btc ".to_string(),
            direction: "long".to_string(),
            entry_price: dec!(45000),
            entry_time: None,
            scanner_source: Some("Momentum".to_string()),
            tier: Some("HIGH".to_string()),
            unified_score: Some(dec!(81.5)),
        }
    }

    fn tracker() -> (SignalTracker, Arc<InMemoryStore>, Arc<RecordingScheduler>) {
        let store = Arc::new(InMemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let tracker = SignalTracker::new(
            SignalValidator::new(&settings()),
            store.clone(),
            scheduler.clone(),
        );
        (tracker, store, scheduler)
    }

    #[test]
    fn validation_normalises_fields() {
        let now = Utc::now();
        let signal = SignalValidator::new(&settings()).validate(&request(), now).unwrap();
        assert_eq!(signal.symbol, "BTC");
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.entry_time, now);
        assert_eq!(signal.scanner_source.as_deref(), Some("momentum"));
        assert_eq!(signal.tier.as_deref(), Some("high"));
    }

    #[test]
    fn validation_rejects_bad_requests() {
        let validator = SignalValidator::new(&settings());
        let now = Utc::now();
        let cases: Vec<(&str, Box<dyn Fn(&mut SignalRequest)>)> = vec![
            ("symbol", Box::new(|r: &mut SignalRequest| r.symbol = "  ".to_string())),
            ("symbol", Box::new(|r: &mut SignalRequest| r.symbol = "BTC USDT".to_string())),
            ("entry_price", Box::new(|r: &mut SignalRequest| r.entry_price = Decimal::ZERO)),
            ("direction", Box::new(|r: &mut SignalRequest| r.direction = "up".to_string())),
            (
                "entry_time",
                Box::new(move |r: &mut SignalRequest| {
                    r.entry_time = Some(now + Duration::hours(1))
                }),
            ),
            ("id", Box::new(|r: &mut SignalRequest| r.id = Some(" ".to_string()))),
            (
                "scanner_source",
                Box::new(|r: &mut SignalRequest| {
                    r.scanner_source = Some("astrology".to_string())
                }),
            ),
            ("tier", Box::new(|r: &mut SignalRequest| r.tier = Some("platinum".to_string()))),
        ];

        for (field, mutate) in cases {
            let mut req = request();
            mutate(&mut req);
            match validator.validate(&req, now) {
                Err(EngineError::InvalidSignal { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected {} to be rejected, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn missing_id_gets_a_generated_one() {
        let mut req = request();
        req.id = None;
        let signal = SignalValidator::new(&settings()).validate(&req, Utc::now()).unwrap();
        assert!(Uuid::parse_str(&signal.id).is_ok());
    }

    #[test]
    fn small_clock_skew_is_tolerated() {
        let now = Utc::now();
        let mut req = request();
        req.entry_time = Some(now + Duration::seconds(30));
        assert!(SignalValidator::new(&settings()).validate(&req, now).is_ok());
    }

    #[tokio::test]
    async fn track_persists_and_schedules_five_checks() {
        let (tracker, store, scheduler) = tracker();
        let outcome = tracker.track(request()).await.unwrap();

        assert!(matches!(outcome, TrackOutcome::Tracked(ref s) if s.id == "s1"));
        assert_eq!(scheduler.scheduled.lock().unwrap().len(), 5);
        assert_eq!(store.open_checks().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn retracking_is_a_no_op() {
        let (tracker, store, scheduler) = tracker();
        tracker.track(request()).await.unwrap();

        let mut again = request();
        again.entry_price = dec!(99999);
        let outcome = tracker.track(again).await.unwrap();

        assert_eq!(outcome, TrackOutcome::AlreadyTracked("s1".to_string()));
        assert_eq!(scheduler.scheduled.lock().unwrap().len(), 5);
        let open = store.open_checks().await.unwrap();
        assert!(open.iter().all(|(s, _)| s.entry_price == dec!(45000)));
    }

    #[tokio::test]
    async fn invalid_request_has_no_side_effects() {
        let (tracker, store, scheduler) = tracker();
        let mut req = request();
        req.direction = "sideways".to_string();

        assert!(tracker.track(req).await.is_err());
        assert!(scheduler.scheduled.lock().unwrap().is_empty());
        assert!(store.open_checks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_updates_scheduler_and_store() {
        let (tracker, store, scheduler) = tracker();
        tracker.track(request()).await.unwrap();

        assert_eq!(tracker.cancel("s1").await.unwrap(), 5);
        assert_eq!(scheduler.cancelled.lock().unwrap().as_slice(), ["s1".to_string()]);
        assert_eq!(
            store.check_state(&CheckKey::new("s1", CheckInterval::ThirtyDays)).await,
            Some(CheckState::Cancelled)
        );
    }

    #[tokio::test]
    async fn resync_reloads_open_checks_and_applies_remote_cancellations() {
        let (tracker, store, scheduler) = tracker();
        let mut other = request();
        other.id = Some("s2".to_string());
        let s1 = SignalValidator::new(&settings()).validate(&request(), Utc::now()).unwrap();
        let s2 = SignalValidator::new(&settings()).validate(&other, Utc::now()).unwrap();
        store.insert_signal(&s1, &s1.checks()).await.unwrap();
        store.insert_signal(&s2, &s2.checks()).await.unwrap();

        let first = tracker.resync().await.unwrap();
        assert_eq!(first.rescheduled, 10);
        assert_eq!(first.cancelled_signals, 0);

        // Cancelled by another process (e.g. the CLI) between resyncs.
        store.cancel_signal("s2").await.unwrap();
        let second = tracker.resync().await.unwrap();
        assert_eq!(second.rescheduled, 5);
        assert_eq!(second.cancelled_signals, 1);
        assert!(scheduler.cancelled.lock().unwrap().contains(&"s2".to_string()));
    }
}
