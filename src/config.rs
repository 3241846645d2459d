use crate::candles::AggregationConfig;
use crate::Result;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::fmt;

const DEFAULT_CONFIG_NAME: &str = "willow";
const ENV_PREFIX: &str = "WILLOW";

pub const KRAKEN_WS_PUBLIC_URL: &str = "wss://ws.kraken.com";
pub const KRAKEN_WS_PRIVATE_URL: &str = "wss://ws-auth.kraken.com";
pub const KRAKEN_REST_URL: &str = "https://api.kraken.com";

/// Process settings: optional TOML file overlaid with `WILLOW__*` env vars
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Pair identifiers in feed notation, e.g. "XBT/USD"
    pub pairs: Vec<String>,
    /// Log orders instead of sending them
    pub paper_trading: bool,
    /// Also follow the authenticated own-trades feed
    pub private_feed: bool,
    pub feed: FeedSettings,
    pub exchange: ExchangeSettings,
    pub evaluation: EvaluationSettings,
    pub storage: StorageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pairs: vec!["XBT/USD".to_string(), "ETH/USD".to_string()],
            paper_trading: false,
            private_feed: false,
            feed: FeedSettings::default(),
            exchange: ExchangeSettings::default(),
            evaluation: EvaluationSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedSettings {
    pub public_url: String,
    pub private_url: String,
    pub reconnect_delay_secs: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            public_url: KRAKEN_WS_PUBLIC_URL.to_string(),
            private_url: KRAKEN_WS_PRIVATE_URL.to_string(),
            reconnect_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExchangeSettings {
    pub rest_url: String,
    pub requests_per_minute: u32,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            rest_url: KRAKEN_REST_URL.to_string(),
            requests_per_minute: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluationSettings {
    pub interval_secs: u64,
    pub score_threshold: u8,
    /// Quote-currency amount spent per order
    pub notional_per_trade: f64,
    pub candle_interval_secs: i64,
    pub min_ticks: usize,
    pub min_candles: usize,
    pub lookback_hours: Option<u64>,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            score_threshold: 70,
            notional_per_trade: 20.0,
            candle_interval_secs: 300,
            min_ticks: 50,
            min_candles: 50,
            lookback_hours: None,
        }
    }
}

impl EvaluationSettings {
    pub fn aggregation(&self) -> AggregationConfig {
        AggregationConfig {
            interval_secs: self.candle_interval_secs,
            min_ticks: self.min_ticks,
            min_candles: self.min_candles,
            lookback_hours: self.lookback_hours,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TickBackend {
    Memory,
    Redis,
    Postgres,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub tick_backend: TickBackend,
    pub redis_url: String,
    /// Score/order history; in-memory only when unset
    pub database_url: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            tick_backend: TickBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            database_url: None,
        }
    }
}

impl Settings {
    /// Load from `path` (or `willow.toml` when present) plus environment
    ///
    /// Not validated: callers apply CLI overrides first, then `validate`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(p) => File::with_name(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    /// Parse settings from TOML text, without environment overrides
    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("pairs")
            .try_parsing(true)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pairs.is_empty() {
            return Err("at least one pair must be configured".into());
        }
        if self.evaluation.interval_secs == 0 {
            return Err("evaluation.interval_secs must be positive".into());
        }
        if self.evaluation.score_threshold > 100 {
            return Err("evaluation.score_threshold must be within 0..=100".into());
        }
        let notional = self.evaluation.notional_per_trade;
        if !notional.is_finite() || notional <= 0.0 {
            return Err("evaluation.notional_per_trade must be positive".into());
        }
        if self.evaluation.candle_interval_secs <= 0 {
            return Err("evaluation.candle_interval_secs must be positive".into());
        }
        Ok(())
    }
}

/// Exchange API key pair, injected into the REST client at startup
#[derive(Clone, PartialEq)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Read `KRAKEN_API_KEY` / `KRAKEN_API_SECRET`; `None` if either is missing
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("KRAKEN_API_KEY").ok().filter(|k| !k.is_empty())?;
        let api_secret = std::env::var("KRAKEN_API_SECRET")
            .ok()
            .filter(|s| !s.is_empty())?;
        Some(Self::new(api_key, api_secret))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Base64-encoded private key
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}
