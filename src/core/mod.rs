//! Core domain types
//!
//! Exchange identifiers, currency pairs, the connector lifecycle state
//! machine, and the shared wall clock used for all persisted timestamps.

pub mod market_data;
pub mod opportunity;

pub use market_data::{
    BookTicker, ConnectionStatus, ExchangeConnectionStatus, HeartbeatRecord, PriceRecord,
    ValidatedPrice, ValidityReason,
};
pub use opportunity::{composite_key, dec, profit_percent, OpportunityRecord};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exchange identifier
///
/// One variant per supported wire protocol. The set is closed because each
/// exchange needs a codec implementation; enabling/disabling an exchange at
/// runtime is a configuration concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    Binance,
    Bybit,
    Htx,
    Mexc,
    Coindcx,
}

impl ExchangeId {
    /// All supported exchanges, in metrics-slot order
    pub const ALL: [ExchangeId; 5] = [
        ExchangeId::Binance,
        ExchangeId::Bybit,
        ExchangeId::Htx,
        ExchangeId::Mexc,
        ExchangeId::Coindcx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "binance",
            ExchangeId::Bybit => "bybit",
            ExchangeId::Htx => "htx",
            ExchangeId::Mexc => "mexc",
            ExchangeId::Coindcx => "coindcx",
        }
    }

    /// Stable slot index for per-exchange counters
    #[inline(always)]
    pub fn index(&self) -> usize {
        match self {
            ExchangeId::Binance => 0,
            ExchangeId::Bybit => 1,
            ExchangeId::Htx => 2,
            ExchangeId::Mexc => 3,
            ExchangeId::Coindcx => 4,
        }
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(ExchangeId::Binance),
            "bybit" => Ok(ExchangeId::Bybit),
            "htx" | "huobi" => Ok(ExchangeId::Htx),
            "mexc" => Ok(ExchangeId::Mexc),
            "coindcx" => Ok(ExchangeId::Coindcx),
            other => Err(format!("unknown exchange: {other}")),
        }
    }
}

/// Currency pair in canonical (base, quote) form
///
/// Exchange-specific symbols ("btcusdt", "B-BTC_USDT") are mapped onto this
/// via the configured trading pairs; all cross-exchange grouping keys off it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Canonical grouping key, e.g. "BTC/USDT"
    pub fn key(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Connector lifecycle state
///
/// `Dead` is terminal until the orchestrator starts a fresh connect attempt.
/// A connector in `Connected`/`Degraded` always holds a live transport;
/// entering `Dead` closes the transport and clears subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectorState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Degraded = 3,
    Dead = 4,
}

impl ConnectorState {
    #[inline]
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectorState::Connecting,
            2 => ConnectorState::Connected,
            3 => ConnectorState::Degraded,
            4 => ConnectorState::Dead,
            _ => ConnectorState::Disconnected,
        }
    }

    #[inline(always)]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// True while the connector nominally holds a transport
    #[inline]
    pub fn has_transport(self) -> bool {
        matches!(self, ConnectorState::Connected | ConnectorState::Degraded)
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectorState::Disconnected => "disconnected",
            ConnectorState::Connecting => "connecting",
            ConnectorState::Connected => "connected",
            ConnectorState::Degraded => "degraded",
            ConnectorState::Dead => "dead",
        };
        f.write_str(s)
    }
}

/// Current wall-clock time in unix milliseconds
///
/// All persisted timestamps (prices, heartbeats, opportunities) use this so
/// records from different processes stay comparable.
#[inline]
pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_id_roundtrip() {
        for ex in ExchangeId::ALL {
            assert_eq!(ex.as_str().parse::<ExchangeId>().unwrap(), ex);
        }
        assert!("deribit".parse::<ExchangeId>().is_err());
    }

    #[test]
    fn test_exchange_index_is_stable() {
        for (i, ex) in ExchangeId::ALL.iter().enumerate() {
            assert_eq!(ex.index(), i);
        }
    }

    #[test]
    fn test_currency_pair_key() {
        let pair = CurrencyPair::new("btc", "usdt");
        assert_eq!(pair.key(), "BTC/USDT");
        assert_eq!(pair.to_string(), "BTC/USDT");
    }

    #[test]
    fn test_connector_state_roundtrip() {
        for state in [
            ConnectorState::Disconnected,
            ConnectorState::Connecting,
            ConnectorState::Connected,
            ConnectorState::Degraded,
            ConnectorState::Dead,
        ] {
            assert_eq!(ConnectorState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_has_transport() {
        assert!(ConnectorState::Connected.has_transport());
        assert!(ConnectorState::Degraded.has_transport());
        assert!(!ConnectorState::Dead.has_transport());
        assert!(!ConnectorState::Disconnected.has_transport());
    }

    #[test]
    fn test_now_ms_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000); // sanity: after 2020
    }
}
