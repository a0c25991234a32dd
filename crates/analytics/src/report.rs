use crate::error::AnalyticsError;
use chrono::{DateTime, Utc};
use core_types::OutcomeRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Group label for records that carry no value for the grouped field.
pub const UNKNOWN_GROUP: &str = "unknown";

/// Win-rate statistics over a set of outcome records.
///
/// All percentages are from the signal's point of view: a SHORT that fell 6%
/// contributes +6 to `avg_win_pct` and `avg_pnl_pct`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total: usize,
    pub wins: usize,
    pub losses: usize,
    pub neutral: usize,
    /// `wins / total * 100`; zero for an empty set.
    pub win_rate: Decimal,
    /// Mean P&L of the WIN records.
    pub avg_win_pct: Decimal,
    /// Mean P&L of the LOSS records (zero or negative).
    pub avg_loss_pct: Decimal,
    /// Mean P&L over all records.
    pub avg_pnl_pct: Decimal,
}

impl AggregateStats {
    /// Creates a zeroed-out value, the result for an empty window.
    pub fn empty() -> Self {
        Self {
            total: 0,
            wins: 0,
            losses: 0,
            neutral: 0,
            win_rate: Decimal::ZERO,
            avg_win_pct: Decimal::ZERO,
            avg_loss_pct: Decimal::ZERO,
            avg_pnl_pct: Decimal::ZERO,
        }
    }
}

impl Default for AggregateStats {
    fn default() -> Self {
        Self::empty()
    }
}

/// The axes `StatisticsEngine::group_by` can slice records by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsDimension {
    ScannerSource,
    Tier,
    Interval,
    Direction,
}

impl StatsDimension {
    pub const ALL: [StatsDimension; 4] = [
        StatsDimension::ScannerSource,
        StatsDimension::Tier,
        StatsDimension::Interval,
        StatsDimension::Direction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatsDimension::ScannerSource => "scanner_source",
            StatsDimension::Tier => "tier",
            StatsDimension::Interval => "interval",
            StatsDimension::Direction => "direction",
        }
    }

    /// The group label of `record` along this dimension.
    pub fn key_of(&self, record: &OutcomeRecord) -> String {
        let label = match self {
            StatsDimension::ScannerSource => record.scanner_source.clone(),
            StatsDimension::Tier => record.tier.clone(),
            StatsDimension::Interval => Some(record.interval.label().to_string()),
            StatsDimension::Direction => Some(record.direction.as_str().to_string()),
        };
        label
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| UNKNOWN_GROUP.to_string())
    }
}

impl FromStr for StatsDimension {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "scanner_source" | "scannersource" | "scanner" | "source" => {
                Ok(StatsDimension::ScannerSource)
            }
            "tier" => Ok(StatsDimension::Tier),
            "interval" => Ok(StatsDimension::Interval),
            "direction" => Ok(StatsDimension::Direction),
            _ => Err(AnalyticsError::UnknownDimension(s.to_string())),
        }
    }
}

impl fmt::Display for StatsDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolStats {
    pub symbol: String,
    pub stats: AggregateStats,
}

/// Best and worst individual outcomes and symbols in a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopPerformers {
    pub best_signals: Vec<OutcomeRecord>,
    pub worst_signals: Vec<OutcomeRecord>,
    /// Only symbols with enough records to be meaningful.
    pub best_symbols: Vec<SymbolStats>,
    pub worst_symbols: Vec<SymbolStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        })
    }
}

/// A piece of human-readable guidance derived from the statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub severity: Severity,
    pub message: String,
}

impl Recommendation {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

/// Everything the statistics surface knows about one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub window_days: u32,
    pub generated_at: DateTime<Utc>,
    pub overall: AggregateStats,
    pub by_scanner_source: BTreeMap<String, AggregateStats>,
    pub by_tier: BTreeMap<String, AggregateStats>,
    pub by_interval: BTreeMap<String, AggregateStats>,
    pub by_direction: BTreeMap<String, AggregateStats>,
    pub top_performers: TopPerformers,
    pub recommendations: Vec<Recommendation>,
}

impl StatisticsReport {
    pub fn breakdown(&self, dimension: StatsDimension) -> &BTreeMap<String, AggregateStats> {
        match dimension {
            StatsDimension::ScannerSource => &self.by_scanner_source,
            StatsDimension::Tier => &self.by_tier,
            StatsDimension::Interval => &self.by_interval,
            StatsDimension::Direction => &self.by_direction,
        }
    }
}
