use core_types::OutcomeThresholds;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire application.
///
/// Every section is optional in `config.toml`; missing sections fall back to
/// the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub price_oracle: PriceOracleSettings,
    pub evaluation: EvaluationSettings,
    pub scheduler: SchedulerSettings,
    pub fallback: FallbackSettings,
    pub signals: SignalSettings,
    pub statistics: StatisticsSettings,
    pub logging: LoggingSettings,
}

/// Connection settings for the primary outcome store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Postgres connection string. Usually supplied through `HINDSIGHT__DATABASE__URL`.
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/hindsight".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

/// Settings for the REST price lookup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PriceOracleSettings {
    pub base_url: String,
    /// Appended to bare symbols ("BTC" -> "BTCUSDT") before querying the exchange.
    pub quote_asset: String,
    pub request_timeout_secs: u64,
}

impl Default for PriceOracleSettings {
    fn default() -> Self {
        Self {
            base_url: "https://fapi.binance.com".to_string(),
            quote_asset: "USDT".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// Parameters for classifying outcomes and bounding the blocking calls of an evaluation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    /// Favourable move (in percent) at or beyond which a check is a WIN.
    pub win_threshold_pct: Decimal,
    /// Adverse move (in percent) at or beyond which a check is a LOSS.
    pub loss_threshold_pct: Decimal,
    pub price_timeout_secs: u64,
    pub store_timeout_secs: u64,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            win_threshold_pct: dec!(5.0),
            loss_threshold_pct: dec!(3.0),
            price_timeout_secs: 10,
            store_timeout_secs: 10,
        }
    }
}

impl EvaluationSettings {
    pub fn thresholds(&self) -> OutcomeThresholds {
        OutcomeThresholds {
            win_pct: self.win_threshold_pct,
            loss_pct: self.loss_threshold_pct,
        }
    }

    pub fn price_timeout(&self) -> Duration {
        Duration::from_secs(self.price_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Upper bound on evaluations running at the same time.
    pub max_concurrent_evaluations: usize,
    /// How often the daemon reloads open checks from the store.
    pub resync_interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_evaluations: 32,
            resync_interval_secs: 300,
        }
    }
}

/// Where outcome records go when the primary store rejects a write.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    pub path: PathBuf,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/outcomes_fallback.jsonl"),
        }
    }
}

/// Intake rules for incoming signals.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    /// Accepted scanner sources. Empty accepts any non-empty value.
    pub scanner_sources: Vec<String>,
    /// Accepted tiers. Empty accepts any non-empty value.
    pub tiers: Vec<String>,
    /// How far in the future an explicit entry time may lie (clock skew allowance).
    pub max_entry_time_skew_secs: i64,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            scanner_sources: Vec::new(),
            tiers: vec!["high".to_string(), "medium".to_string(), "low".to_string()],
            max_entry_time_skew_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatisticsSettings {
    /// Symbols with fewer records are left out of the best/worst symbol rankings.
    pub min_symbol_samples: usize,
    /// Overall win rate below which the report asks for optimisation.
    pub target_win_rate_pct: Decimal,
    /// Groups with fewer records are not judged by the recommendation rules.
    pub min_group_samples: usize,
}

impl Default for StatisticsSettings {
    fn default() -> Self {
        Self {
            min_symbol_samples: 3,
            target_win_rate_pct: dec!(55),
            min_group_samples: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is not set.
    pub level: String,
    /// Emit JSON lines on the console instead of the human-readable format.
    pub json: bool,
    /// When set, logs are also written to a daily-rolling file in this directory.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}
