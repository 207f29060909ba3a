//! Shared state store
//!
//! The only shared mutable resource in the system: connectors write prices
//! and heartbeats, calculators read all prices and write opportunities.
//! Validity of a price is derived from the owning exchange's connection
//! health, never from the price's own age.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use crate::core::{
    ConnectionStatus, ExchangeConnectionStatus, ExchangeId, HeartbeatRecord, OpportunityRecord,
    ValidatedPrice, ValidityReason,
};
use async_trait::async_trait;

/// Store operation errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(e: ::redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of `save_opportunity`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// First sighting of this composite key
    Created(String),
    /// Existing active record refreshed in place
    Updated(String),
}

impl SaveOutcome {
    pub fn id(&self) -> &str {
        match self {
            SaveOutcome::Created(id) | SaveOutcome::Updated(id) => id,
        }
    }
}

/// What a cleanup sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed_opportunities: usize,
    pub removed_prices: usize,
}

/// Store timing/retention policy
///
/// Defaults follow the documented configuration defaults; all values are
/// overridable through `StoreSettings`.
#[derive(Debug, Clone, Copy)]
pub struct StorePolicy {
    /// Heartbeat expiry: the exchange is "online" within this window
    pub heartbeat_ttl_secs: i64,
    /// Prices stay usable until the exchange is offline this long
    pub invalidation_threshold_secs: i64,
    /// Cleanup: minimum offline duration before a price is eligible
    pub offline_cleanup_secs: i64,
    /// Cleanup: minimum price age before a price is eligible
    pub price_age_cleanup_secs: i64,
    /// Opportunity retention window
    pub opportunity_retention_secs: i64,
    /// Maximum active opportunity cardinality
    pub max_active_opportunities: usize,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            heartbeat_ttl_secs: 90,
            invalidation_threshold_secs: 1800,
            offline_cleanup_secs: 3600,
            price_age_cleanup_secs: 7200,
            opportunity_retention_secs: 30 * 24 * 3600,
            max_active_opportunities: 10_000,
        }
    }
}

/// Three-tier price validity from current heartbeat state
///
/// - heartbeat alive (unexpired): valid, online
/// - expired but within the invalidation threshold: still valid — brief
///   connection flaps must not punch holes in the price set
/// - beyond the threshold, or no heartbeat at all: invalid, long offline
pub fn classify_validity(
    now_ms: i64,
    heartbeat: Option<&HeartbeatRecord>,
    policy: &StorePolicy,
) -> (bool, ValidityReason, Option<i64>) {
    let Some(hb) = heartbeat else {
        return (false, ValidityReason::LongOffline, None);
    };
    let elapsed_secs = (now_ms - hb.last_heartbeat_ms) / 1000;
    if elapsed_secs <= policy.heartbeat_ttl_secs {
        (true, ValidityReason::Online, Some(elapsed_secs))
    } else if elapsed_secs <= policy.invalidation_threshold_secs {
        (true, ValidityReason::RecentOffline, Some(elapsed_secs))
    } else {
        (false, ValidityReason::LongOffline, Some(elapsed_secs))
    }
}

/// Connection status for the status summary, from the same tiers
pub fn classify_status(reason: ValidityReason) -> ConnectionStatus {
    match reason {
        ValidityReason::Online => ConnectionStatus::Online,
        ValidityReason::RecentOffline => ConnectionStatus::RecentlyOffline,
        ValidityReason::LongOffline => ConnectionStatus::LongOffline,
    }
}

/// Shared state store contract
///
/// Implementations must provide read-after-write consistency per key and
/// observe one `save_price` call's price+heartbeat update atomically.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Upsert a price record and refresh the exchange heartbeat in one batch
    ///
    /// This is the only write path that proves the exchange is alive.
    async fn save_price(
        &self,
        exchange: ExchangeId,
        symbol: &str,
        bid: f64,
        ask: f64,
        bid_volume: f64,
        ask_volume: f64,
    ) -> Result<()>;

    /// Every stored price with its validity under the current heartbeats
    async fn get_all_prices(&self) -> Result<Vec<ValidatedPrice>>;

    /// Per-exchange connection health, including exchanges inferred from
    /// stored prices that never wrote a heartbeat (treated as long offline)
    async fn get_exchange_connection_status(&self) -> Result<Vec<ExchangeConnectionStatus>>;

    /// Dedup-upsert an opportunity by composite key
    async fn save_opportunity(&self, record: OpportunityRecord) -> Result<SaveOutcome>;

    /// Latest active opportunities, newest first
    async fn get_latest_opportunities(&self, limit: usize) -> Result<Vec<OpportunityRecord>>;

    /// Active opportunity count
    async fn get_opportunities_count(&self) -> Result<u64>;

    /// Full scan of active records for maximum profit (set is capped)
    async fn get_highest_profit_opportunity(&self) -> Result<Option<OpportunityRecord>>;

    /// Conservative sweep: expired opportunities, and prices whose exchange
    /// has been offline too long AND whose own age is too high
    async fn cleanup_old_data(&self) -> Result<CleanupReport>;

    /// Release backend resources
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(last_ms: i64) -> HeartbeatRecord {
        HeartbeatRecord {
            exchange: ExchangeId::Binance,
            last_heartbeat_ms: last_ms,
            heartbeat_count: 10,
            connection_start_ms: 0,
        }
    }

    #[test]
    fn test_validity_online_regardless_of_price_age() {
        let policy = StorePolicy::default();
        let now = 1_000_000_000;
        let (valid, reason, elapsed) =
            classify_validity(now, Some(&heartbeat(now - 5_000)), &policy);
        assert!(valid);
        assert_eq!(reason, ValidityReason::Online);
        assert_eq!(elapsed, Some(5));
    }

    #[test]
    fn test_validity_recent_offline_still_valid() {
        let policy = StorePolicy::default();
        let now = 1_000_000_000;
        // 91s offline: past the 90s TTL but well under 1800s
        let (valid, reason, _) = classify_validity(now, Some(&heartbeat(now - 91_000)), &policy);
        assert!(valid);
        assert_eq!(reason, ValidityReason::RecentOffline);
    }

    #[test]
    fn test_validity_long_offline_invalid() {
        let policy = StorePolicy::default();
        let now = 1_000_000_000;
        let (valid, reason, _) =
            classify_validity(now, Some(&heartbeat(now - 1_801_000)), &policy);
        assert!(!valid);
        assert_eq!(reason, ValidityReason::LongOffline);
    }

    #[test]
    fn test_validity_boundary_at_invalidation_threshold() {
        let policy = StorePolicy::default();
        let now = 1_000_000_000;
        // exactly at the threshold: still valid
        let (valid, reason, _) =
            classify_validity(now, Some(&heartbeat(now - 1_800_000)), &policy);
        assert!(valid);
        assert_eq!(reason, ValidityReason::RecentOffline);
    }

    #[test]
    fn test_validity_missing_heartbeat_is_long_offline() {
        let policy = StorePolicy::default();
        let (valid, reason, elapsed) = classify_validity(1_000_000_000, None, &policy);
        assert!(!valid);
        assert_eq!(reason, ValidityReason::LongOffline);
        assert_eq!(elapsed, None);
    }

    #[test]
    fn test_save_outcome_id() {
        assert_eq!(SaveOutcome::Created("a".into()).id(), "a");
        assert_eq!(SaveOutcome::Updated("b".into()).id(), "b");
    }
}
