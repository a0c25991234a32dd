use crate::error::ConfigError;
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{
    Config, DatabaseSettings, EvaluationSettings, FallbackSettings, LoggingSettings,
    PriceOracleSettings, SchedulerSettings, SignalSettings, StatisticsSettings,
};

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Loads the application configuration from `config.toml` and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Loads the configuration from `path`, then applies `HINDSIGHT__*` environment overrides.
///
/// The file is optional: a missing file yields the defaults plus whatever the
/// environment provides. Nested keys use a double underscore, for example
/// `HINDSIGHT__DATABASE__URL` or `HINDSIGHT__EVALUATION__WIN_THRESHOLD_PCT`.
pub fn load_config_from(path: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("HINDSIGHT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("signals.scanner_sources")
                .with_list_parse_key("signals.tiers"),
        );
    build(builder)
}

fn build(builder: ConfigBuilder<DefaultState>) -> Result<Config, ConfigError> {
    let config = builder.build()?.try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.database.url.trim().is_empty() {
            return invalid("database.url must not be empty");
        }
        if self.database.max_connections == 0 {
            return invalid("database.max_connections must be at least 1");
        }
        if self.price_oracle.base_url.trim().is_empty() {
            return invalid("price_oracle.base_url must not be empty");
        }
        if self.evaluation.win_threshold_pct <= rust_decimal::Decimal::ZERO
            || self.evaluation.loss_threshold_pct <= rust_decimal::Decimal::ZERO
        {
            return invalid("evaluation thresholds must be positive percentages");
        }
        if self.evaluation.price_timeout_secs == 0 || self.evaluation.store_timeout_secs == 0 {
            return invalid("evaluation timeouts must be at least one second");
        }
        if self.scheduler.max_concurrent_evaluations == 0 {
            return invalid("scheduler.max_concurrent_evaluations must be at least 1");
        }
        if self.scheduler.resync_interval_secs == 0 {
            return invalid("scheduler.resync_interval_secs must be at least 1");
        }
        if self.signals.max_entry_time_skew_secs < 0 {
            return invalid("signals.max_entry_time_skew_secs must not be negative");
        }
        if self.fallback.path.as_os_str().is_empty() {
            return invalid("fallback.path must not be empty");
        }
        Ok(())
    }
}
