use crate::DbError;
use crate::store::{CheckStore, OutcomeFilter, OutcomeStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    CheckInterval, CheckKey, CheckState, Direction, Outcome, OutcomeRecord, ScheduledCheck,
    TrackedSignal,
};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};
use std::str::FromStr;

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_column<T: FromStr>(row: &PgRow, column: &str) -> Result<T, DbError>
where
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .map_err(|e| DbError::Decode(format!("{}: {}", column, e)))
}

fn outcome_from_row(row: &PgRow) -> Result<OutcomeRecord, DbError> {
    Ok(OutcomeRecord {
        signal_id: row.try_get("signal_id")?,
        interval: parse_column::<CheckInterval>(row, "check_interval")?,
        symbol: row.try_get("symbol")?,
        direction: parse_column::<Direction>(row, "direction")?,
        entry_price: row.try_get("entry_price")?,
        exit_price: row.try_get("exit_price")?,
        pnl_pct: row.try_get("pnl_pct")?,
        outcome: parse_column::<Outcome>(row, "outcome")?,
        checked_at: row.try_get("checked_at")?,
        scanner_source: row.try_get("scanner_source")?,
        tier: row.try_get("tier")?,
        unified_score: row.try_get("unified_score")?,
    })
}

const OUTCOME_COLUMNS: &str = "signal_id, check_interval, symbol, direction, entry_price, \
     exit_price, pnl_pct, outcome, checked_at, scanner_source, tier, unified_score";

#[async_trait]
impl OutcomeStore for DbRepository {
    /// Inserts or replaces the outcome for `(signal_id, check_interval)`.
    async fn upsert_outcome(&self, record: &OutcomeRecord) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO signal_outcomes (
                signal_id, check_interval, symbol, direction, entry_price, exit_price,
                pnl_pct, outcome, checked_at, scanner_source, tier, unified_score
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT ON CONSTRAINT signal_outcomes_signal_interval_key DO UPDATE SET
                exit_price = EXCLUDED.exit_price,
                pnl_pct = EXCLUDED.pnl_pct,
                outcome = EXCLUDED.outcome,
                checked_at = EXCLUDED.checked_at,
                symbol = EXCLUDED.symbol,
                direction = EXCLUDED.direction,
                entry_price = EXCLUDED.entry_price,
                scanner_source = EXCLUDED.scanner_source,
                tier = EXCLUDED.tier,
                unified_score = EXCLUDED.unified_score
            "#,
        )
        .bind(&record.signal_id)
        .bind(record.interval.label())
        .bind(&record.symbol)
        .bind(record.direction.as_str())
        .bind(record.entry_price)
        .bind(record.exit_price)
        .bind(record.pnl_pct)
        .bind(record.outcome.as_str())
        .bind(record.checked_at)
        .bind(&record.scanner_source)
        .bind(&record.tier)
        .bind(record.unified_score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_outcome(&self, key: &CheckKey) -> Result<Option<OutcomeRecord>, DbError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM signal_outcomes WHERE signal_id = $1 AND check_interval = $2",
            OUTCOME_COLUMNS
        ))
        .bind(&key.signal_id)
        .bind(key.interval.label())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(outcome_from_row).transpose()
    }

    async fn query_outcomes(&self, filter: &OutcomeFilter) -> Result<Vec<OutcomeRecord>, DbError> {
        // NULL parameters disable their predicate.
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM signal_outcomes
            WHERE ($1::timestamptz IS NULL OR checked_at >= $1)
              AND ($2::text IS NULL OR signal_id = $2)
              AND ($3::text IS NULL OR check_interval = $3)
            ORDER BY checked_at ASC, signal_id ASC, check_interval ASC
            "#,
            OUTCOME_COLUMNS
        ))
        .bind(filter.since)
        .bind(filter.signal_id.as_deref())
        .bind(filter.interval.map(|i| i.label()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(outcome_from_row).collect()
    }
}

#[async_trait]
impl CheckStore for DbRepository {
    /// Saves the signal and its checks within a single transaction for atomicity.
    async fn insert_signal(
        &self,
        signal: &TrackedSignal,
        checks: &[ScheduledCheck],
    ) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO tracked_signals (
                signal_id, symbol, direction, entry_price, entry_time,
                scanner_source, tier, unified_score
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (signal_id) DO NOTHING
            "#,
        )
        .bind(&signal.id)
        .bind(&signal.symbol)
        .bind(signal.direction.as_str())
        .bind(signal.entry_price)
        .bind(signal.entry_time)
        .bind(&signal.scanner_source)
        .bind(&signal.tier)
        .bind(signal.unified_score)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for check in checks {
            sqlx::query(
                r#"
                INSERT INTO scheduled_checks (signal_id, check_interval, fire_at, state)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (signal_id, check_interval) DO NOTHING
                "#,
            )
            .bind(&check.signal_id)
            .bind(check.interval.label())
            .bind(check.fire_at)
            .bind(check.state.as_str())
            .execute(&mut *tx) // Note: must use the transaction object `tx` here
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn set_check_state(&self, key: &CheckKey, state: CheckState) -> Result<bool, DbError> {
        let updated = sqlx::query(
            r#"
            UPDATE scheduled_checks
            SET state = $1, updated_at = NOW()
            WHERE signal_id = $2 AND check_interval = $3
              AND state IN ('PENDING', 'FIRED')
            "#,
        )
        .bind(state.as_str())
        .bind(&key.signal_id)
        .bind(key.interval.label())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    async fn open_checks(&self) -> Result<Vec<(TrackedSignal, ScheduledCheck)>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT s.signal_id, s.symbol, s.direction, s.entry_price, s.entry_time,
                   s.scanner_source, s.tier, s.unified_score,
                   c.check_interval, c.fire_at, c.state
            FROM scheduled_checks AS c
            JOIN tracked_signals AS s ON s.signal_id = c.signal_id
            WHERE c.state IN ('PENDING', 'FIRED') AND s.cancelled_at IS NULL
            ORDER BY c.fire_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(TrackedSignal, ScheduledCheck), DbError> {
                let signal = TrackedSignal {
                    id: row.try_get("signal_id")?,
                    symbol: row.try_get("symbol")?,
                    direction: parse_column::<Direction>(row, "direction")?,
                    entry_price: row.try_get("entry_price")?,
                    entry_time: row.try_get("entry_time")?,
                    scanner_source: row.try_get("scanner_source")?,
                    tier: row.try_get("tier")?,
                    unified_score: row.try_get("unified_score")?,
                };
                let check = ScheduledCheck {
                    signal_id: signal.id.clone(),
                    interval: parse_column::<CheckInterval>(row, "check_interval")?,
                    fire_at: row.try_get("fire_at")?,
                    state: parse_column::<CheckState>(row, "state")?,
                };
                Ok((signal, check))
            })
            .collect()
    }

    async fn cancel_signal(&self, signal_id: &str) -> Result<usize, DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE tracked_signals SET cancelled_at = NOW() WHERE signal_id = $1 AND cancelled_at IS NULL",
        )
        .bind(signal_id)
        .execute(&mut *tx)
        .await?;

        let cancelled = sqlx::query(
            r#"
            UPDATE scheduled_checks
            SET state = 'CANCELLED', updated_at = NOW()
            WHERE signal_id = $1 AND state = 'PENDING'
            "#,
        )
        .bind(signal_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(cancelled as usize)
    }

    async fn cancelled_since(&self, since: DateTime<Utc>) -> Result<Vec<String>, DbError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT signal_id FROM tracked_signals WHERE cancelled_at >= $1 ORDER BY cancelled_at ASC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
