use crate::error::EngineError;
use api_client::PriceOracle;
use chrono::Utc;
use core_types::{CheckInterval, OutcomeRecord, OutcomeThresholds, TrackedSignal};
use database::{PersistedTo, PersistenceSink};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Why a due check produced no outcome record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The oracle errored, timed out, or had no price for the symbol.
    PriceUnavailable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PriceUnavailable => f.write_str("price unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Recorded(OutcomeRecord, PersistedTo),
    Skipped(SkipReason),
}

/// Turns a due check into an outcome record: price lookup, P&L, classification, persistence.
pub struct OutcomeEvaluator {
    oracle: Arc<dyn PriceOracle>,
    sink: Arc<dyn PersistenceSink>,
    thresholds: OutcomeThresholds,
    price_timeout: Duration,
}

impl OutcomeEvaluator {
    pub fn new(
        oracle: Arc<dyn PriceOracle>,
        sink: Arc<dyn PersistenceSink>,
        thresholds: OutcomeThresholds,
        price_timeout: Duration,
    ) -> Self {
        Self {
            oracle,
            sink,
            thresholds,
            price_timeout,
        }
    }

    pub fn thresholds(&self) -> &OutcomeThresholds {
        &self.thresholds
    }

    /// Evaluates `signal` at `interval` against the current price.
    ///
    /// A missing price is a skip, not an error. Errors are reserved for a
    /// failed P&L calculation or for both persistence paths failing.
    pub async fn evaluate(
        &self,
        signal: &TrackedSignal,
        interval: CheckInterval,
    ) -> Result<Evaluation, EngineError> {
        let lookup = self.oracle.current_price(&signal.symbol);
        let price = match tokio::time::timeout(self.price_timeout, lookup).await {
            Ok(Ok(Some(price))) => price,
            Ok(Ok(None)) => {
                warn!(
                    signal_id = %signal.id,
                    symbol = %signal.symbol,
                    %interval,
                    "No price available, skipping check"
                );
                return Ok(Evaluation::Skipped(SkipReason::PriceUnavailable));
            }
            Ok(Err(e)) => {
                warn!(
                    signal_id = %signal.id,
                    symbol = %signal.symbol,
                    %interval,
                    error = %e,
                    "Price lookup failed, skipping check"
                );
                return Ok(Evaluation::Skipped(SkipReason::PriceUnavailable));
            }
            Err(_) => {
                warn!(
                    signal_id = %signal.id,
                    symbol = %signal.symbol,
                    %interval,
                    timeout = ?self.price_timeout,
                    "Price lookup timed out, skipping check"
                );
                return Ok(Evaluation::Skipped(SkipReason::PriceUnavailable));
            }
        };

        let record =
            OutcomeRecord::evaluate(signal, interval, price, &self.thresholds, Utc::now())?;
        debug!(
            signal_id = %record.signal_id,
            %interval,
            exit_price = %record.exit_price,
            pnl_pct = %record.pnl_pct.round_dp(2),
            outcome = %record.outcome,
            "Outcome computed"
        );

        let persisted = self.sink.persist(&record).await?;
        Ok(Evaluation::Recorded(record, persisted))
    }
}
