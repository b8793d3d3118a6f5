use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::exchange::binance::BINANCE_API_BASE;
use crate::exchange::CANDLE_INTERVALS;
use crate::execution::EngineSettings;
use crate::models::TradingPair;
use crate::strategy::SignalConfig;

/// Prefix of environment overrides, e.g. `DIPBOT_TARGET_PAIRS=BTC/USDT,ETH/USDT`
pub const ENV_PREFIX: &str = "DIPBOT";

/// Largest candle window a single klines request can return
const MAX_BASELINE_PERIODS: usize = 1000;

/// Runtime configuration: defaults, then an optional TOML file, then environment
#[derive(Clone, Deserialize)]
pub struct BotConfig {
    pub api_key: String,
    pub secret_key: String,
    pub target_pairs: Vec<TradingPair>,
    /// Total quote-asset budget, split evenly across pairs
    pub investment: f64,
    pub threshold_percent: f64,
    pub sell_profit_margin: f64,
    /// Candle bucket used for baselines (`1m`, `5m`, `1h`, ...)
    pub time_interval: String,
    pub baseline_periods: usize,
    pub sleep_interval_secs: u64,
    pub stop_timeout_secs: u64,
    pub bind_addr: SocketAddr,
    pub exchange_base_url: String,
    pub rate_limit_per_minute: u32,
    pub paper_trading: bool,
    /// Starting quote balance of the paper wallet; defaults to `investment`
    pub paper_quote_balance: Option<f64>,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("api_key", &redact(&self.api_key))
            .field("secret_key", &redact(&self.secret_key))
            .field("target_pairs", &self.target_pairs)
            .field("investment", &self.investment)
            .field("threshold_percent", &self.threshold_percent)
            .field("sell_profit_margin", &self.sell_profit_margin)
            .field("time_interval", &self.time_interval)
            .field("baseline_periods", &self.baseline_periods)
            .field("sleep_interval_secs", &self.sleep_interval_secs)
            .field("stop_timeout_secs", &self.stop_timeout_secs)
            .field("bind_addr", &self.bind_addr)
            .field("exchange_base_url", &self.exchange_base_url)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("paper_trading", &self.paper_trading)
            .field("paper_quote_balance", &self.paper_quote_balance)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl BotConfig {
    /// Defaults, then the optional TOML file at `path`, then the environment.
    /// Callers may layer overrides on top before `from_builder` validates.
    pub fn builder(path: Option<&Path>) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let mut builder = Self::defaults()?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("target_pairs"),
        );

        Ok(builder)
    }

    /// Built-in defaults, matching the reference deployment
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("api_key", "")?
            .set_default("secret_key", "")?
            .set_default("target_pairs", vec!["BTC/USDT"])?
            .set_default("investment", 85.0)?
            .set_default("threshold_percent", 5.0)?
            .set_default("sell_profit_margin", 1.05)?
            .set_default("time_interval", "1m")?
            .set_default("baseline_periods", 20)?
            .set_default("sleep_interval_secs", 60)?
            .set_default("stop_timeout_secs", 300)?
            .set_default("bind_addr", "127.0.0.1:5000")?
            .set_default("exchange_base_url", BINANCE_API_BASE)?
            .set_default("rate_limit_per_minute", 1200)?
            .set_default("paper_trading", false)?)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: BotConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject anything that would only blow up once the loop is running
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_pairs.is_empty() {
            return Err(ConfigError::NoPairs);
        }

        let mut seen = HashSet::new();
        for pair in &self.target_pairs {
            if !seen.insert(pair) {
                return Err(invalid("target_pairs", format!("{} listed twice", pair)));
            }
        }

        if !(self.investment.is_finite() && self.investment > 0.0) {
            return Err(invalid("investment", "must be a positive amount"));
        }
        if !(self.threshold_percent > 0.0 && self.threshold_percent < 100.0) {
            return Err(invalid("threshold_percent", "must be between 0 and 100"));
        }
        if !(self.sell_profit_margin.is_finite() && self.sell_profit_margin > 0.0) {
            return Err(invalid("sell_profit_margin", "must be positive"));
        }
        if !CANDLE_INTERVALS.contains(&self.time_interval.as_str()) {
            return Err(invalid(
                "time_interval",
                format!("unknown interval '{}'", self.time_interval),
            ));
        }
        if self.baseline_periods == 0 || self.baseline_periods > MAX_BASELINE_PERIODS {
            return Err(invalid(
                "baseline_periods",
                format!("must be between 1 and {}", MAX_BASELINE_PERIODS),
            ));
        }
        if self.sleep_interval_secs == 0 {
            return Err(invalid("sleep_interval_secs", "must be at least 1 second"));
        }
        if let Some(balance) = self.paper_quote_balance {
            if !(balance.is_finite() && balance >= 0.0) {
                return Err(invalid("paper_quote_balance", "must not be negative"));
            }
        }
        if !self.paper_trading && (self.api_key.is_empty() || self.secret_key.is_empty()) {
            return Err(invalid(
                "api_key",
                "API key and secret are required unless paper trading",
            ));
        }

        if self.sell_profit_margin < 1.0 {
            tracing::warn!(
                margin = self.sell_profit_margin,
                "Sell profit margin below 1.0 sells positions at a loss"
            );
        }

        Ok(())
    }

    pub fn signal_config(&self) -> SignalConfig {
        SignalConfig {
            threshold_percent: self.threshold_percent,
            sell_profit_margin: self.sell_profit_margin,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            pairs: self.target_pairs.clone(),
            total_investment: self.investment,
            signals: self.signal_config(),
            cycle_interval: Duration::from_secs(self.sleep_interval_secs),
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn paper_quote_balance(&self) -> f64 {
        self.paper_quote_balance.unwrap_or(self.investment)
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        reason: reason.into(),
    }
}
