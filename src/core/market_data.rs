//! Market data records
//!
//! Decoded best bid/ask frames, the persisted price and heartbeat records,
//! and the derived validity/connection-status types the store computes from
//! them. Validity is a property of the owning exchange's connection health,
//! never of a price's own age.

use super::ExchangeId;
use serde::{Deserialize, Serialize};

/// Best bid/ask as decoded from one exchange frame
///
/// `symbol` is still in the exchange's own format; mapping to a
/// [`CurrencyPair`](super::CurrencyPair) happens against configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BookTicker {
    pub symbol: String,
    pub bid_price: f64,
    pub bid_qty: f64,
    pub ask_price: f64,
    pub ask_qty: f64,
    /// Exchange-reported event time (unix millis), 0 when not provided
    pub timestamp_ms: i64,
}

impl BookTicker {
    /// A quote is plausible when both sides are positive and not crossed
    pub fn is_plausible(&self) -> bool {
        self.bid_price > 0.0 && self.ask_price > 0.0 && self.bid_price <= self.ask_price
    }
}

/// Persisted price record, one per (exchange, symbol)
///
/// Written only by the owning exchange's connector. Carries no expiry;
/// it survives until overwritten or removed by the conservative cleanup
/// sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub exchange: ExchangeId,
    pub symbol: String,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_volume: f64,
    pub ask_volume: f64,
    /// When the connector ingested this quote (unix millis)
    pub observed_at_ms: i64,
}

/// Per-exchange liveness marker
///
/// Refreshed on every successful price write, not on protocol pings. The
/// single source of truth for "is this exchange connection alive".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub exchange: ExchangeId,
    pub last_heartbeat_ms: i64,
    pub heartbeat_count: u64,
    pub connection_start_ms: i64,
}

/// Why a price is (in)valid right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidityReason {
    /// Heartbeat present and unexpired
    Online,
    /// Heartbeat expired but within the invalidation threshold
    RecentOffline,
    /// No heartbeat, or offline beyond the invalidation threshold
    LongOffline,
}

/// A price record annotated with its current validity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedPrice {
    pub record: PriceRecord,
    pub is_valid: bool,
    pub reason: ValidityReason,
    /// None when the exchange has never written a heartbeat
    pub seconds_since_heartbeat: Option<i64>,
}

/// Coarse connection status derived from heartbeat state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Online,
    RecentlyOffline,
    LongOffline,
}

/// Per-exchange connection health summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConnectionStatus {
    pub exchange: ExchangeId,
    pub status: ConnectionStatus,
    pub seconds_since_heartbeat: Option<i64>,
    pub heartbeat_count: u64,
}
