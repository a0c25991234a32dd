use crate::enums::{CheckInterval, CheckState, Direction, Outcome};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A raw request to track a signal, exactly as a caller submits it.
///
/// Nothing here is trusted yet. The tracker validates and normalises it into a
/// `TrackedSignal` before any check is scheduled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub symbol: String,
    pub direction: String,
    pub entry_price: Decimal,
    #[serde(default)]
    pub entry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scanner_source: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub unified_score: Option<Decimal>,
}

/// A validated signal. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSignal {
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub scanner_source: Option<String>,
    pub tier: Option<String>,
    pub unified_score: Option<Decimal>,
}

impl TrackedSignal {
    /// Builds the five checks for this signal, one per interval, shortest first.
    pub fn checks(&self) -> Vec<ScheduledCheck> {
        CheckInterval::ALL
            .iter()
            .map(|interval| ScheduledCheck::new(self, *interval))
            .collect()
    }
}

/// Identifies one check: the idempotency key for both scheduling and outcome records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckKey {
    pub signal_id: String,
    pub interval: CheckInterval,
}

impl CheckKey {
    pub fn new(signal_id: impl Into<String>, interval: CheckInterval) -> Self {
        Self {
            signal_id: signal_id.into(),
            interval,
        }
    }
}

/// A deferred outcome check for one signal at one interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCheck {
    pub signal_id: String,
    pub interval: CheckInterval,
    pub fire_at: DateTime<Utc>,
    pub state: CheckState,
}

impl ScheduledCheck {
    pub fn new(signal: &TrackedSignal, interval: CheckInterval) -> Self {
        Self {
            signal_id: signal.id.clone(),
            interval,
            fire_at: signal.entry_time + interval.offset(),
            state: CheckState::Pending,
        }
    }

    pub fn key(&self) -> CheckKey {
        CheckKey::new(self.signal_id.clone(), self.interval)
    }
}

/// The win/loss bars a price move has to clear, in percent.
///
/// Both values are magnitudes. The win bar is deliberately wider than the loss
/// bar: a signal has to earn its WIN, while a modest adverse move already counts
/// as a LOSS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeThresholds {
    pub win_pct: Decimal,
    pub loss_pct: Decimal,
}

impl Default for OutcomeThresholds {
    fn default() -> Self {
        Self {
            win_pct: dec!(5.0),
            loss_pct: dec!(3.0),
        }
    }
}

impl OutcomeThresholds {
    /// Classifies a raw price change for the given direction. Boundaries are inclusive.
    pub fn classify(&self, direction: Direction, pnl_pct: Decimal) -> Outcome {
        match direction {
            Direction::Long => {
                if pnl_pct >= self.win_pct {
                    Outcome::Win
                } else if pnl_pct <= -self.loss_pct {
                    Outcome::Loss
                } else {
                    Outcome::Neutral
                }
            }
            Direction::Short => {
                if pnl_pct <= -self.win_pct {
                    Outcome::Win
                } else if pnl_pct >= self.loss_pct {
                    Outcome::Loss
                } else {
                    Outcome::Neutral
                }
            }
        }
    }
}

/// Percentage change from `entry_price` to `exit_price`.
pub fn pnl_pct(entry_price: Decimal, exit_price: Decimal) -> Result<Decimal, CoreError> {
    if entry_price <= Decimal::ZERO {
        return Err(CoreError::NonPositivePrice(entry_price));
    }
    (exit_price - entry_price)
        .checked_div(entry_price)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .ok_or_else(|| {
            CoreError::Calculation(format!("pnl overflow for exit price {}", exit_price))
        })
}

/// The evaluated result of one check. At most one exists per `(signal_id, interval)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub signal_id: String,
    pub interval: CheckInterval,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pnl_pct: Decimal,
    pub outcome: Outcome,
    pub checked_at: DateTime<Utc>,
    // Denormalised grouping metadata.
    pub scanner_source: Option<String>,
    pub tier: Option<String>,
    pub unified_score: Option<Decimal>,
}

impl OutcomeRecord {
    /// Evaluates `signal` at `interval` against the observed `exit_price`.
    pub fn evaluate(
        signal: &TrackedSignal,
        interval: CheckInterval,
        exit_price: Decimal,
        thresholds: &OutcomeThresholds,
        checked_at: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        let pnl_pct = pnl_pct(signal.entry_price, exit_price)?;
        Ok(Self {
            signal_id: signal.id.clone(),
            interval,
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            entry_price: signal.entry_price,
            exit_price,
            pnl_pct,
            outcome: thresholds.classify(signal.direction, pnl_pct),
            checked_at,
            scanner_source: signal.scanner_source.clone(),
            tier: signal.tier.clone(),
            unified_score: signal.unified_score,
        })
    }

    pub fn key(&self) -> CheckKey {
        CheckKey::new(self.signal_id.clone(), self.interval)
    }

    /// The P&L from the signal's point of view: positive means the call was right.
    pub fn directional_pnl_pct(&self) -> Decimal {
        match self.direction {
            Direction::Long => self.pnl_pct,
            Direction::Short => -self.pnl_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signal(direction: Direction) -> TrackedSignal {
        TrackedSignal {
            id: "s1".to_string(),
            symbol: "BTC".to_string(),
            direction,
            entry_price: dec!(45000),
            entry_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            scanner_source: Some("momentum".to_string()),
            tier: Some("high".to_string()),
            unified_score: Some(dec!(82.5)),
        }
    }

    #[test]
    fn long_thresholds() {
        let t = OutcomeThresholds::default();
        assert_eq!(t.classify(Direction::Long, dec!(6.0)), Outcome::Win);
        assert_eq!(t.classify(Direction::Long, dec!(-4.0)), Outcome::Loss);
        assert_eq!(t.classify(Direction::Long, dec!(2.0)), Outcome::Neutral);
    }

    #[test]
    fn short_thresholds() {
        let t = OutcomeThresholds::default();
        assert_eq!(t.classify(Direction::Short, dec!(-6.0)), Outcome::Win);
        assert_eq!(t.classify(Direction::Short, dec!(4.0)), Outcome::Loss);
        assert_eq!(t.classify(Direction::Short, dec!(-2.0)), Outcome::Neutral);
    }

    #[test]
    fn boundaries_are_inclusive() {
        let t = OutcomeThresholds::default();
        assert_eq!(t.classify(Direction::Long, dec!(5.0)), Outcome::Win);
        assert_eq!(t.classify(Direction::Long, dec!(-3.0)), Outcome::Loss);
        assert_eq!(t.classify(Direction::Short, dec!(-5.0)), Outcome::Win);
        assert_eq!(t.classify(Direction::Short, dec!(3.0)), Outcome::Loss);
        assert_eq!(t.classify(Direction::Long, dec!(4.9999)), Outcome::Neutral);
    }

    #[test]
    fn checks_fire_at_entry_plus_offset() {
        let s = signal(Direction::Long);
        let checks = s.checks();
        assert_eq!(checks.len(), 5);
        assert_eq!(checks[0].fire_at, s.entry_time + chrono::Duration::hours(1));
        assert_eq!(checks[4].fire_at, s.entry_time + chrono::Duration::days(30));
        assert!(checks.iter().all(|c| c.state == CheckState::Pending));
    }

    #[test]
    fn evaluate_computes_pnl_and_carries_metadata() {
        let s = signal(Direction::Long);
        let record = OutcomeRecord::evaluate(
            &s,
            CheckInterval::FourHours,
            dec!(47800),
            &OutcomeThresholds::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(record.outcome, Outcome::Win);
        assert_eq!(record.pnl_pct.round_dp(2), dec!(6.22));
        assert_eq!(record.tier.as_deref(), Some("high"));
        assert_eq!(record.key(), CheckKey::new("s1", CheckInterval::FourHours));
    }

    #[test]
    fn short_win_has_positive_directional_pnl() {
        let s = signal(Direction::Short);
        let record = OutcomeRecord::evaluate(
            &s,
            CheckInterval::OneHour,
            dec!(42300),
            &OutcomeThresholds::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(record.outcome, Outcome::Win);
        assert!(record.pnl_pct < Decimal::ZERO);
        assert!(record.directional_pnl_pct() > Decimal::ZERO);
    }

    #[test]
    fn pnl_rejects_non_positive_entry() {
        assert!(pnl_pct(Decimal::ZERO, dec!(1)).is_err());
    }
}
