use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::domain::MarginType;
use crate::signing::ApiCredentials;

pub const LIVE_BASE_URL: &str = "https://fapi.binance.com";
pub const DEMO_BASE_URL: &str = "https://demo-fapi.binance.com";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    pub ladder: LadderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Target exchange environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingEnv {
    Demo,
    Live,
}

impl TradingEnv {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            TradingEnv::Demo => DEMO_BASE_URL,
            TradingEnv::Live => LIVE_BASE_URL,
        }
    }

    /// Environment variables holding the (key, secret) pair for this environment.
    pub fn credential_vars(&self) -> (&'static str, &'static str) {
        match self {
            TradingEnv::Demo => ("BINANCE_DEMO_API_KEY", "BINANCE_DEMO_SECRET_KEY"),
            TradingEnv::Live => ("BINANCE_API_KEY", "BINANCE_SECRET_KEY"),
        }
    }
}

impl std::fmt::Display for TradingEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingEnv::Demo => write!(f, "demo"),
            TradingEnv::Live => write!(f, "live"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub environment: TradingEnv,
    /// Overrides the environment's default REST endpoint
    #[serde(default)]
    pub base_url: Option<String>,
    /// recvWindow attached to every signed request
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    /// Per-request HTTP timeout
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_recv_window() -> u64 {
    5000
}

fn default_timeout() -> u64 {
    10_000
}

impl ExchangeConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.default_base_url())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Read the credential pair for the configured environment.
    ///
    /// Returns `None` when either variable is unset or empty; signed requests
    /// then fail with a configuration error before touching the network.
    pub fn credentials_from_env(&self) -> Option<ApiCredentials> {
        let (key_var, secret_var) = self.environment.credential_vars();
        let api_key = std::env::var(key_var).ok().filter(|v| !v.is_empty())?;
        let secret = std::env::var(secret_var).ok().filter(|v| !v.is_empty())?;
        Some(ApiCredentials::new(api_key, secret))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// The only symbol the engine will trade
    pub allowed_symbol: String,
    /// Quote-currency notional used when an entry carries no quantity
    pub default_notional: Decimal,
    pub leverage: u32,
    pub margin_type: MarginType,
    /// When false, order and account writes are simulated
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LadderConfig {
    /// Tick offsets tried in order before the market fallback
    pub tick_offsets: Vec<u32>,
    /// Maximum time spent waiting on each limit attempt
    pub wait_per_attempt_ms: u64,
    /// Poll cadence within an attempt; unset means a single check after the wait
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

impl LadderConfig {
    pub fn wait_per_attempt(&self) -> Duration {
        Duration::from_millis(self.wait_per_attempt_ms)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            tick_offsets: vec![1, 2, 3],
            wait_per_attempt_ms: 2000,
            poll_interval_ms: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily-rotated log files
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("exchange.environment", "demo")?
            .set_default("exchange.recv_window_ms", 5000)?
            .set_default("exchange.timeout_ms", 10_000)?
            .set_default("trading.allowed_symbol", "ETHUSDT")?
            .set_default("trading.default_notional", "20")?
            .set_default("trading.leverage", 3)?
            .set_default("trading.margin_type", "ISOLATED")?
            .set_default("trading.enabled", false)?
            .set_default("ladder.tick_offsets", vec![1, 2, 3])?
            .set_default("ladder.wait_per_attempt_ms", 2000)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(
                    std::env::var("LADDERFILL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // LADDERFILL_TRADING__ALLOWED_SYMBOL, LADDERFILL_LADDER__TICK_OFFSETS=1,2,3, ...
            .add_source(
                Environment::with_prefix("LADDERFILL")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("ladder.tick_offsets")
                    .try_parsing(true),
            );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        config.trading.allowed_symbol = config.trading.allowed_symbol.trim().to_uppercase();
        Ok(config)
    }

    /// Configuration used by tests and dry local runs
    pub fn default_config(allowed_symbol: &str) -> Self {
        use rust_decimal_macros::dec;

        Self {
            exchange: ExchangeConfig {
                environment: TradingEnv::Demo,
                base_url: None,
                recv_window_ms: 5000,
                timeout_ms: 10_000,
            },
            trading: TradingConfig {
                allowed_symbol: allowed_symbol.to_uppercase(),
                default_notional: dec!(20),
                leverage: 3,
                margin_type: MarginType::Isolated,
                enabled: false,
            },
            ladder: LadderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.trading.allowed_symbol.is_empty() {
            errors.push("allowed_symbol must not be empty".to_string());
        }

        if self.trading.default_notional <= Decimal::ZERO {
            errors.push("default_notional must be positive".to_string());
        }

        if !(1..=125).contains(&self.trading.leverage) {
            errors.push(format!(
                "leverage must be between 1 and 125, got {}",
                self.trading.leverage
            ));
        }

        let offsets = &self.ladder.tick_offsets;
        if offsets.is_empty() {
            errors.push("ladder.tick_offsets must not be empty".to_string());
        }
        if offsets.iter().any(|n| *n == 0) {
            errors.push("ladder.tick_offsets must be positive".to_string());
        }
        if offsets.windows(2).any(|w| w[0] >= w[1]) {
            errors.push("ladder.tick_offsets must be strictly ascending".to_string());
        }

        if let Some(poll) = self.ladder.poll_interval_ms {
            if poll == 0 || poll > self.ladder.wait_per_attempt_ms {
                errors.push(
                    "ladder.poll_interval_ms must be positive and not exceed wait_per_attempt_ms"
                        .to_string(),
                );
            }
        }

        if self.exchange.timeout_ms == 0 {
            errors.push("exchange.timeout_ms must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
