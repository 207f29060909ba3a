//! Configuration management
//!
//! Loads configuration from config.toml at startup (path overridable via
//! the CONFIG_PATH environment variable). Every tunable has a serde
//! default so a missing file yields a runnable configuration.

use crate::core::{CurrencyPair, ExchangeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Screener configuration
///
/// Loaded from config.toml at startup. Contains all tunable parameters
/// to avoid hardcoded values throughout the codebase.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Which exchanges to run connectors for
    #[serde(default)]
    pub exchanges: ExchangeSettings,

    /// Monitored pairs with their per-pair gating rules
    #[serde(default)]
    pub pairs: Vec<PairSettings>,

    /// State store backend and retention policy
    #[serde(default)]
    pub store: StoreSettings,

    /// Connector health thresholds
    #[serde(default)]
    pub connector: ConnectorSettings,

    /// Calculator cadence and publish limits
    #[serde(default)]
    pub calculator: CalculatorSettings,

    /// Worker supervision budgets
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Downstream publishing
    #[serde(default)]
    pub publish: PublishSettings,
}

/// Exchange selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeSettings {
    /// Exchange names to enable; unknown names fail validation
    #[serde(default = "default_enabled_exchanges")]
    pub enabled: Vec<String>,

    /// WebSocket endpoint overrides (exchange name -> ws/wss URL);
    /// absent entries use each exchange's production endpoint
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
}

/// One monitored pair with its arbitrage gating rules
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PairSettings {
    pub base: String,
    pub quote: String,

    /// Disabled pairs stay in the file but are not monitored
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum profit percent for an opportunity on this pair
    #[serde(default = "default_threshold_percent")]
    pub threshold_percent: f64,

    /// Minimum executable volume (base units); 0 disables the floor
    #[serde(default)]
    pub min_volume: f64,

    /// Maximum executable volume (base units); 0 disables the cap
    #[serde(default)]
    pub max_volume: f64,

    /// Exchange-native symbol overrides (exchange name -> symbol);
    /// absent entries fall back to the exchange's naming convention
    #[serde(default)]
    pub symbols: HashMap<String, String>,

    /// Per-exchange gating overrides (exchange name -> rule); absent
    /// fields fall back to the pair-level values above
    #[serde(default)]
    pub overrides: HashMap<String, PairOverrideSettings>,
}

/// Gating overrides for one pair on one exchange
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PairOverrideSettings {
    #[serde(default)]
    pub threshold_percent: Option<f64>,

    #[serde(default)]
    pub min_volume: Option<f64>,

    #[serde(default)]
    pub max_volume: Option<f64>,
}

/// State store backend and retention policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreSettings {
    /// "memory" or "redis"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Heartbeat expiry; within this window an exchange is online
    #[serde(default = "default_heartbeat_ttl")]
    pub heartbeat_ttl_secs: i64,

    /// Offline duration after which prices become invalid
    #[serde(default = "default_invalidation_threshold")]
    pub invalidation_threshold_secs: i64,

    /// Cleanup: minimum offline duration before a price is removable
    #[serde(default = "default_offline_cleanup")]
    pub offline_cleanup_secs: i64,

    /// Cleanup: minimum price age before a price is removable
    #[serde(default = "default_price_age_cleanup")]
    pub price_age_cleanup_secs: i64,

    /// How long detected opportunities are retained
    #[serde(default = "default_opportunity_retention")]
    pub opportunity_retention_secs: i64,

    /// Cap on concurrently active opportunities
    #[serde(default = "default_max_active_opportunities")]
    pub max_active_opportunities: usize,
}

/// Connector health thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectorSettings {
    /// Seconds without any inbound frame before the connection is
    /// declared dead
    #[serde(default = "default_message_flow_timeout")]
    pub message_flow_timeout_secs: u64,

    /// How often the health task samples inbound message flow
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,
}

/// Calculator cadence and publish limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CalculatorSettings {
    /// Evaluation cycle interval
    #[serde(default = "default_calc_interval_ms")]
    pub interval_ms: u64,

    /// Number of concurrent calculator workers
    #[serde(default = "default_calculator_count")]
    pub workers: usize,

    /// Max opportunities published per cycle
    #[serde(default = "default_publish_limit")]
    pub publish_limit: usize,
}

/// Worker supervision budgets
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorSettings {
    /// Connect attempts per reconnection burst (exponential backoff)
    #[serde(default = "default_max_connect_retries")]
    pub max_connect_retries: u32,

    /// Exhausted reconnection bursts before a worker stops permanently
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,

    /// Cleanup sweep interval
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Status/metrics logging interval
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,
}

/// Downstream publishing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublishSettings {
    /// Per-symbol price publish throttle
    #[serde(default = "default_price_throttle_ms")]
    pub price_throttle_ms: u64,

    /// Broadcast channel capacity
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled_exchanges(),
            endpoints: HashMap::new(),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            redis_url: default_redis_url(),
            heartbeat_ttl_secs: default_heartbeat_ttl(),
            invalidation_threshold_secs: default_invalidation_threshold(),
            offline_cleanup_secs: default_offline_cleanup(),
            price_age_cleanup_secs: default_price_age_cleanup(),
            opportunity_retention_secs: default_opportunity_retention(),
            max_active_opportunities: default_max_active_opportunities(),
        }
    }
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            message_flow_timeout_secs: default_message_flow_timeout(),
            health_check_interval_secs: default_health_check_interval(),
        }
    }
}

impl Default for CalculatorSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_calc_interval_ms(),
            workers: default_calculator_count(),
            publish_limit: default_publish_limit(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_connect_retries: default_max_connect_retries(),
            max_failures: default_max_failures(),
            cleanup_interval_secs: default_cleanup_interval(),
            monitor_interval_secs: default_monitor_interval(),
        }
    }
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            price_throttle_ms: default_price_throttle_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_enabled_exchanges() -> Vec<String> {
    ExchangeId::ALL.iter().map(|e| e.as_str().to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_threshold_percent() -> f64 {
    0.5
}

fn default_store_backend() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_heartbeat_ttl() -> i64 {
    90
}

fn default_invalidation_threshold() -> i64 {
    1800 // 30 minutes
}

fn default_offline_cleanup() -> i64 {
    3600 // 1 hour
}

fn default_price_age_cleanup() -> i64 {
    7200 // 2 hours
}

fn default_opportunity_retention() -> i64 {
    30 * 24 * 3600 // 30 days
}

fn default_max_active_opportunities() -> usize {
    10_000
}

fn default_message_flow_timeout() -> u64 {
    30
}

fn default_health_check_interval() -> u64 {
    5
}

fn default_calc_interval_ms() -> u64 {
    100
}

fn default_calculator_count() -> usize {
    2
}

fn default_publish_limit() -> usize {
    50
}

fn default_max_connect_retries() -> u32 {
    5
}

fn default_max_failures() -> u32 {
    10
}

fn default_cleanup_interval() -> u64 {
    300 // 5 minutes
}

fn default_monitor_interval() -> u64 {
    60
}

fn default_price_throttle_ms() -> u64 {
    2000
}

fn default_channel_capacity() -> usize {
    1024
}

impl Settings {
    /// Load configuration from config.toml
    ///
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be parsed, or if the
    /// parsed configuration fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

        let settings = match std::fs::read_to_string(&config_path) {
            Ok(contents) => {
                toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => return Err(ConfigError::IoError(e)),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in &self.exchanges.enabled {
            ExchangeId::from_str(name)
                .map_err(|_| ConfigError::Invalid(format!("unknown exchange: {name}")))?;
        }
        for (name, endpoint) in &self.exchanges.endpoints {
            ExchangeId::from_str(name)
                .map_err(|_| ConfigError::Invalid(format!("unknown exchange in endpoints: {name}")))?;
            crate::exchanges::ProtocolDescriptor::validate_endpoint(endpoint)
                .map_err(|e| ConfigError::Invalid(format!("{name} endpoint: {e}")))?;
        }
        match self.store.backend.as_str() {
            "memory" | "redis" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown store backend: {other} (expected \"memory\" or \"redis\")"
                )))
            }
        }
        for pair in &self.pairs {
            let key = CurrencyPair::new(&pair.base, &pair.quote).key();
            if pair.threshold_percent < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{key}: threshold_percent must be non-negative"
                )));
            }
            if pair.min_volume < 0.0 || pair.max_volume < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{key}: volumes must be non-negative"
                )));
            }
            if pair.max_volume > 0.0 && pair.max_volume < pair.min_volume {
                return Err(ConfigError::Invalid(format!(
                    "{key}: max_volume below min_volume"
                )));
            }
            for exchange in pair.symbols.keys() {
                ExchangeId::from_str(exchange).map_err(|_| {
                    ConfigError::Invalid(format!("{key}: unknown exchange in symbols: {exchange}"))
                })?;
            }
            for name in pair.overrides.keys() {
                let exchange = ExchangeId::from_str(name).map_err(|_| {
                    ConfigError::Invalid(format!("{key}: unknown exchange in overrides: {name}"))
                })?;
                // Check the effective per-exchange rule, not the raw override
                if pair.threshold_for(exchange) < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "{key}/{name}: threshold_percent must be non-negative"
                    )));
                }
                let (min, max) = (pair.min_volume_for(exchange), pair.max_volume_for(exchange));
                if min < 0.0 || max < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "{key}/{name}: volumes must be non-negative"
                    )));
                }
                if max > 0.0 && max < min {
                    return Err(ConfigError::Invalid(format!(
                        "{key}/{name}: max_volume below min_volume"
                    )));
                }
            }
        }
        if self.calculator.workers == 0 {
            return Err(ConfigError::Invalid(
                "calculator.workers must be at least 1".to_string(),
            ));
        }
        if self.store.invalidation_threshold_secs < self.store.heartbeat_ttl_secs {
            return Err(ConfigError::Invalid(
                "store.invalidation_threshold_secs must not be below heartbeat_ttl_secs"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Enabled exchanges, parsed
    pub fn enabled_exchanges(&self) -> Vec<ExchangeId> {
        self.exchanges
            .enabled
            .iter()
            .filter_map(|name| ExchangeId::from_str(name).ok())
            .collect()
    }

    /// Configured endpoint override for one exchange, if any
    pub fn endpoint_override(&self, exchange: ExchangeId) -> Option<&str> {
        self.exchanges
            .endpoints
            .get(exchange.as_str())
            .map(String::as_str)
    }
}

impl PairSettings {
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(&self.base, &self.quote)
    }

    /// Exchange-native symbol for this pair
    ///
    /// An explicit override wins; otherwise the exchange's naming
    /// convention is applied.
    pub fn symbol_for(&self, exchange: ExchangeId) -> String {
        if let Some(symbol) = self.symbols.get(exchange.as_str()) {
            return symbol.clone();
        }
        let base = self.base.to_uppercase();
        let quote = self.quote.to_uppercase();
        match exchange {
            ExchangeId::Binance | ExchangeId::Bybit | ExchangeId::Mexc => {
                format!("{base}{quote}")
            }
            ExchangeId::Htx => format!("{base}{quote}").to_lowercase(),
            ExchangeId::Coindcx => format!("B-{base}_{quote}"),
        }
    }

    /// Profit threshold for this pair on one exchange
    pub fn threshold_for(&self, exchange: ExchangeId) -> f64 {
        self.overrides
            .get(exchange.as_str())
            .and_then(|o| o.threshold_percent)
            .unwrap_or(self.threshold_percent)
    }

    pub fn min_volume_for(&self, exchange: ExchangeId) -> f64 {
        self.overrides
            .get(exchange.as_str())
            .and_then(|o| o.min_volume)
            .unwrap_or(self.min_volume)
    }

    pub fn max_volume_for(&self, exchange: ExchangeId) -> f64 {
        self.overrides
            .get(exchange.as_str())
            .and_then(|o| o.max_volume)
            .unwrap_or(self.max_volume)
    }
}

impl StoreSettings {
    pub fn to_policy(&self) -> crate::store::StorePolicy {
        crate::store::StorePolicy {
            heartbeat_ttl_secs: self.heartbeat_ttl_secs,
            invalidation_threshold_secs: self.invalidation_threshold_secs,
            offline_cleanup_secs: self.offline_cleanup_secs,
            price_age_cleanup_secs: self.price_age_cleanup_secs,
            opportunity_retention_secs: self.opportunity_retention_secs,
            max_active_opportunities: self.max_active_opportunities,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_validate() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.exchanges.enabled.len(), 5);
        assert_eq!(settings.store.backend, "memory");
        assert_eq!(settings.store.heartbeat_ttl_secs, 90);
        assert_eq!(settings.store.invalidation_threshold_secs, 1800);
        assert_eq!(settings.calculator.workers, 2);
        assert_eq!(settings.orchestrator.max_failures, 10);
    }

    #[test]
    fn test_symbol_conventions() {
        let pair = PairSettings {
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
            enabled: true,
            threshold_percent: 0.5,
            min_volume: 0.0,
            max_volume: 0.0,
            symbols: HashMap::new(),
            overrides: HashMap::new(),
        };
        assert_eq!(pair.symbol_for(ExchangeId::Binance), "BTCUSDT");
        assert_eq!(pair.symbol_for(ExchangeId::Htx), "btcusdt");
        assert_eq!(pair.symbol_for(ExchangeId::Coindcx), "B-BTC_USDT");
    }

    #[test]
    fn test_symbol_override_wins() {
        let mut symbols = HashMap::new();
        symbols.insert("mexc".to_string(), "BTC_USDT".to_string());
        let pair = PairSettings {
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
            enabled: true,
            threshold_percent: 0.5,
            min_volume: 0.0,
            max_volume: 0.0,
            symbols,
            overrides: HashMap::new(),
        };
        assert_eq!(pair.symbol_for(ExchangeId::Mexc), "BTC_USDT");
        assert_eq!(pair.symbol_for(ExchangeId::Bybit), "BTCUSDT");
    }

    #[test]
    fn test_parse_toml() {
        let settings: Settings = toml::from_str(
            r#"
            [exchanges]
            enabled = ["binance", "htx"]

            [[pairs]]
            base = "ETH"
            quote = "USDT"
            threshold_percent = 0.3
            min_volume = 0.01

            [store]
            backend = "redis"
            redis_url = "redis://cache:6379"
            "#,
        )
        .unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.enabled_exchanges(), vec![ExchangeId::Binance, ExchangeId::Htx]);
        assert_eq!(settings.pairs.len(), 1);
        assert_eq!(settings.pairs[0].threshold_percent, 0.3);
        assert_eq!(settings.store.backend, "redis");
    }

    #[test]
    fn test_per_exchange_override_parse() {
        let settings: Settings = toml::from_str(
            r#"
            [[pairs]]
            base = "BTC"
            quote = "USDT"
            threshold_percent = 0.5
            max_volume = 10.0

            [pairs.overrides.binance]
            threshold_percent = 0.2
            max_volume = 2.0
            "#,
        )
        .unwrap();
        settings.validate().unwrap();
        let pair = &settings.pairs[0];
        assert_eq!(pair.threshold_for(ExchangeId::Binance), 0.2);
        assert_eq!(pair.max_volume_for(ExchangeId::Binance), 2.0);
        // Exchanges without an override keep the pair-level values
        assert_eq!(pair.threshold_for(ExchangeId::Bybit), 0.5);
        assert_eq!(pair.max_volume_for(ExchangeId::Bybit), 10.0);
        assert_eq!(pair.min_volume_for(ExchangeId::Binance), 0.0);
    }

    #[test]
    fn test_rejects_unknown_exchange_in_overrides() {
        let settings: Settings = toml::from_str(
            r#"
            [[pairs]]
            base = "BTC"
            quote = "USDT"

            [pairs.overrides.kraken]
            threshold_percent = 0.2
            "#,
        )
        .unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_override_volume_bounds() {
        let settings: Settings = toml::from_str(
            r#"
            [[pairs]]
            base = "BTC"
            quote = "USDT"
            min_volume = 5.0

            [pairs.overrides.htx]
            max_volume = 1.0
            "#,
        )
        .unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_exchange() {
        let settings: Settings = toml::from_str(
            r#"
            [exchanges]
            enabled = ["binance", "kraken"]
            "#,
        )
        .unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_volume_bounds() {
        let settings: Settings = toml::from_str(
            r#"
            [[pairs]]
            base = "BTC"
            quote = "USDT"
            min_volume = 5.0
            max_volume = 1.0
            "#,
        )
        .unwrap();
        assert!(settings.validate().is_err());
    }
}
