use crate::error::AnalyzerError;
use analytics::{
    AggregateStats, Recommendation, StatisticsEngine, StatisticsReport, StatsDimension,
    TopPerformers,
};
use chrono::{Duration, Utc};
use configuration::StatisticsSettings;
use core_types::OutcomeRecord;
use database::{OutcomeFilter, OutcomeStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub mod error;

/// How many entries each best/worst list in a full report holds.
pub const DEFAULT_TOP_LIMIT: usize = 5;

/// The read-only statistics surface over the outcome store.
///
/// Nothing is cached: every call queries the store for its window and hands
/// the records to the `StatisticsEngine`. Records written concurrently may or
/// may not be seen by a given call.
pub struct StatisticsAggregator {
    store: Arc<dyn OutcomeStore>,
    engine: StatisticsEngine,
}

impl StatisticsAggregator {
    pub fn new(store: Arc<dyn OutcomeStore>, settings: &StatisticsSettings) -> Self {
        let engine = StatisticsEngine::new(
            settings.min_symbol_samples,
            settings.target_win_rate_pct,
            settings.min_group_samples,
        );
        Self::with_engine(store, engine)
    }

    pub fn with_engine(store: Arc<dyn OutcomeStore>, engine: StatisticsEngine) -> Self {
        Self { store, engine }
    }

    pub async fn overall_stats(&self, window_days: u32) -> Result<AggregateStats, AnalyzerError> {
        let records = self.window(window_days).await?;
        Ok(self.engine.aggregate(&records))
    }

    pub async fn stats_by_dimension(
        &self,
        dimension: StatsDimension,
        window_days: u32,
    ) -> Result<BTreeMap<String, AggregateStats>, AnalyzerError> {
        let records = self.window(window_days).await?;
        Ok(self.engine.group_by(&records, dimension))
    }

    pub async fn top_performers(
        &self,
        window_days: u32,
        limit: usize,
    ) -> Result<TopPerformers, AnalyzerError> {
        let records = self.window(window_days).await?;
        Ok(self.engine.top_performers(&records, limit))
    }

    /// Rule-derived guidance for an already built report. Does not touch the store.
    pub fn recommendations(&self, report: &StatisticsReport) -> Vec<Recommendation> {
        self.engine.recommendations(report)
    }

    /// Every statistic for one window from a single store query.
    pub async fn full_report(&self, window_days: u32) -> Result<StatisticsReport, AnalyzerError> {
        let records = self.window(window_days).await?;
        Ok(self
            .engine
            .report(&records, window_days, DEFAULT_TOP_LIMIT, Utc::now()))
    }

    async fn window(&self, window_days: u32) -> Result<Vec<OutcomeRecord>, AnalyzerError> {
        if window_days == 0 {
            return Err(AnalyzerError::InvalidWindow(window_days));
        }
        // A window reaching past the representable calendar has no lower bound.
        let filter = Utc::now()
            .checked_sub_signed(Duration::days(i64::from(window_days)))
            .map(OutcomeFilter::since)
            .unwrap_or_default();
        let records = self.store.query_outcomes(&filter).await?;
        debug!(
            window_days,
            since = ?filter.since,
            records = records.len(),
            "Loaded outcomes for aggregation"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_types::{CheckInterval, CheckKey, Direction, Outcome};
    use database::{DbError, InMemoryStore};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn record(
        id: &str,
        interval: CheckInterval,
        pnl: Decimal,
        outcome: Outcome,
        age_days: i64,
    ) -> OutcomeRecord {
        OutcomeRecord {
            signal_id: id.to_string(),
            interval,
            symbol: "BTC".to_string(),
            direction: Direction::Long,
            entry_price: dec!(100),
            exit_price: dec!(100) + pnl,
            pnl_pct: pnl,
            outcome,
            checked_at: Utc::now() - Duration::days(age_days) + Duration::minutes(1),
            scanner_source: Some("momentum".to_string()),
            tier: None,
            unified_score: None,
        }
    }

    async fn seeded() -> StatisticsAggregator {
        let store = Arc::new(InMemoryStore::new());
        for r in [
            record("a", CheckInterval::OneHour, dec!(6), Outcome::Win, 0),
            record("a", CheckInterval::FourHours, dec!(2), Outcome::Neutral, 0),
            record("b", CheckInterval::OneHour, dec!(-4), Outcome::Loss, 2),
            record("c", CheckInterval::OneHour, dec!(9), Outcome::Win, 40),
        ] {
            store.upsert_outcome(&r).await.unwrap();
        }
        StatisticsAggregator::new(store, &StatisticsSettings::default())
    }

    #[tokio::test]
    async fn window_limits_the_records_seen() {
        let aggregator = seeded().await;

        let day = aggregator.overall_stats(1).await.unwrap();
        assert_eq!((day.total, day.wins, day.neutral), (2, 1, 1));
        assert_eq!(day.win_rate, dec!(50));

        let month = aggregator.overall_stats(30).await.unwrap();
        assert_eq!(month.total, 3);
        assert_eq!(month.losses, 1);
    }

    #[tokio::test]
    async fn groups_by_requested_dimension() {
        let aggregator = seeded().await;

        let by_interval = aggregator
            .stats_by_dimension(StatsDimension::Interval, 7)
            .await
            .unwrap();
        assert_eq!(by_interval["1h"].total, 2);
        assert_eq!(by_interval["4h"].neutral, 1);

        let by_tier = aggregator.stats_by_dimension(StatsDimension::Tier, 7).await.unwrap();
        assert_eq!(by_tier.keys().collect::<Vec<_>>(), vec!["unknown"]);
    }

    #[tokio::test]
    async fn zero_day_window_is_rejected() {
        let aggregator = seeded().await;
        assert!(matches!(
            aggregator.overall_stats(0).await,
            Err(AnalyzerError::InvalidWindow(0))
        ));
    }

    #[tokio::test]
    async fn oversized_window_covers_all_history() {
        let aggregator = seeded().await;

        let everything = aggregator.overall_stats(u32::MAX).await.unwrap();
        assert_eq!(everything.total, 4);

        let report = aggregator.full_report(u32::MAX).await.unwrap();
        assert_eq!(report.window_days, u32::MAX);
        assert_eq!(report.overall.wins, 2);
    }

    #[tokio::test]
    async fn full_report_carries_recommendations() {
        let aggregator = seeded().await;
        let report = aggregator.full_report(7).await.unwrap();

        assert_eq!(report.overall.total, 3);
        assert_eq!(report.top_performers.best_signals[0].pnl_pct, dec!(6));
        // One symbol with three records meets the default minimum sample.
        assert_eq!(report.top_performers.best_symbols.len(), 1);
        assert!(!report.recommendations.is_empty());
        assert_eq!(aggregator.recommendations(&report), report.recommendations);
    }

    struct BrokenStore;

    #[async_trait]
    impl OutcomeStore for BrokenStore {
        async fn upsert_outcome(&self, _record: &OutcomeRecord) -> Result<(), DbError> {
            Ok(())
        }

        async fn get_outcome(&self, _key: &CheckKey) -> Result<Option<OutcomeRecord>, DbError> {
            Ok(None)
        }

        async fn query_outcomes(
            &self,
            _filter: &OutcomeFilter,
        ) -> Result<Vec<OutcomeRecord>, DbError> {
            Err(DbError::Decode("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_aggregation_error() {
        let aggregator =
            StatisticsAggregator::new(Arc::new(BrokenStore), &StatisticsSettings::default());
        assert!(matches!(
            aggregator.top_performers(7, 3).await,
            Err(AnalyzerError::Aggregation(_))
        ));
    }
}
