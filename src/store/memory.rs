//! In-process store backend
//!
//! Single-node deployment and test backend. One lock guards all state;
//! every operation takes it exactly once, which gives the atomic
//! price+heartbeat batch and per-key read-after-write consistency the
//! store contract requires. TTLs are emulated from recorded timestamps.

use super::{
    classify_status, classify_validity, CleanupReport, Result, SaveOutcome, StateStore,
    StorePolicy,
};
use crate::core::{
    now_ms, ConnectionStatus, ExchangeConnectionStatus, ExchangeId, HeartbeatRecord,
    OpportunityRecord, PriceRecord, ValidatedPrice,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Inner {
    prices: HashMap<(ExchangeId, String), PriceRecord>,
    heartbeats: HashMap<ExchangeId, HeartbeatRecord>,
    /// Active opportunities keyed by composite key
    active: HashMap<String, OpportunityRecord>,
    /// Time index over active records: (last_seen_ms, composite_key)
    index: BTreeMap<(i64, String), ()>,
    /// Immutable per-detection history copies
    history: Vec<OpportunityRecord>,
}

/// In-memory state store
pub struct MemoryStore {
    inner: RwLock<Inner>,
    policy: StorePolicy,
}

impl MemoryStore {
    pub fn new(policy: StorePolicy) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            policy,
        }
    }

    /// Rewrite an exchange's heartbeat timestamp, for tests that need to
    /// simulate an exchange going quiet without deleting its prices
    #[cfg(test)]
    pub(crate) fn backdate_heartbeat(&self, exchange: ExchangeId, last_heartbeat_ms: i64) {
        let mut inner = self.inner.write();
        if let Some(hb) = inner.heartbeats.get_mut(&exchange) {
            hb.last_heartbeat_ms = last_heartbeat_ms;
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate_price(&self, exchange: ExchangeId, symbol: &str, observed_at_ms: i64) {
        let mut inner = self.inner.write();
        if let Some(price) = inner.prices.get_mut(&(exchange, symbol.to_string())) {
            price.observed_at_ms = observed_at_ms;
        }
    }

    #[cfg(test)]
    pub(crate) fn history_len(&self) -> usize {
        self.inner.read().history.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StorePolicy::default())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn save_price(
        &self,
        exchange: ExchangeId,
        symbol: &str,
        bid: f64,
        ask: f64,
        bid_volume: f64,
        ask_volume: f64,
    ) -> Result<()> {
        let now = now_ms();
        let mut inner = self.inner.write();

        inner.prices.insert(
            (exchange, symbol.to_string()),
            PriceRecord {
                exchange,
                symbol: symbol.to_string(),
                bid_price: bid,
                ask_price: ask,
                bid_volume,
                ask_volume,
                observed_at_ms: now,
            },
        );

        let hb = inner
            .heartbeats
            .entry(exchange)
            .or_insert_with(|| HeartbeatRecord {
                exchange,
                last_heartbeat_ms: now,
                heartbeat_count: 0,
                connection_start_ms: now,
            });
        hb.last_heartbeat_ms = now;
        hb.heartbeat_count += 1;

        Ok(())
    }

    async fn get_all_prices(&self) -> Result<Vec<ValidatedPrice>> {
        let now = now_ms();
        let inner = self.inner.read();

        let mut out = Vec::with_capacity(inner.prices.len());
        for record in inner.prices.values() {
            let heartbeat = inner.heartbeats.get(&record.exchange);
            let (is_valid, reason, seconds_since_heartbeat) =
                classify_validity(now, heartbeat, &self.policy);
            out.push(ValidatedPrice {
                record: record.clone(),
                is_valid,
                reason,
                seconds_since_heartbeat,
            });
        }
        Ok(out)
    }

    async fn get_exchange_connection_status(&self) -> Result<Vec<ExchangeConnectionStatus>> {
        let now = now_ms();
        let inner = self.inner.read();

        let mut exchanges: Vec<ExchangeId> = inner.heartbeats.keys().copied().collect();
        for (exchange, _) in inner.prices.keys() {
            if !exchanges.contains(exchange) {
                exchanges.push(*exchange);
            }
        }

        let mut out = Vec::with_capacity(exchanges.len());
        for exchange in exchanges {
            let heartbeat = inner.heartbeats.get(&exchange);
            let (_, reason, seconds_since_heartbeat) =
                classify_validity(now, heartbeat, &self.policy);
            out.push(ExchangeConnectionStatus {
                exchange,
                status: classify_status(reason),
                seconds_since_heartbeat,
                heartbeat_count: heartbeat.map(|hb| hb.heartbeat_count).unwrap_or(0),
            });
        }
        Ok(out)
    }

    async fn save_opportunity(&self, mut record: OpportunityRecord) -> Result<SaveOutcome> {
        let mut inner = self.inner.write();
        let key = record.composite_key.clone();

        if let Some(existing) = inner.active.get_mut(&key) {
            let previous_seen = existing.last_seen_ms;
            existing.seen_count += 1;
            existing.last_seen_ms = record.timestamp_ms;
            existing.timestamp_ms = record.timestamp_ms;
            let id = existing.id.clone();

            inner.index.remove(&(previous_seen, key.clone()));
            inner.index.insert((record.timestamp_ms, key), ());
            return Ok(SaveOutcome::Updated(id));
        }

        record.id = uuid::Uuid::new_v4().to_string();
        record.first_seen_ms = record.timestamp_ms;
        record.last_seen_ms = record.timestamp_ms;
        record.seen_count = 1;
        let id = record.id.clone();

        inner.history.push(record.clone());
        inner
            .index
            .insert((record.last_seen_ms, key.clone()), ());
        inner.active.insert(key, record);

        // Cap the active set by discarding the oldest
        while inner.active.len() > self.policy.max_active_opportunities {
            let Some((oldest, ())) = inner.index.pop_first() else {
                break;
            };
            inner.active.remove(&oldest.1);
        }

        Ok(SaveOutcome::Created(id))
    }

    async fn get_latest_opportunities(&self, limit: usize) -> Result<Vec<OpportunityRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .index
            .iter()
            .rev()
            .take(limit)
            .filter_map(|((_, key), ())| inner.active.get(key).cloned())
            .collect())
    }

    async fn get_opportunities_count(&self) -> Result<u64> {
        Ok(self.inner.read().active.len() as u64)
    }

    async fn get_highest_profit_opportunity(&self) -> Result<Option<OpportunityRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .active
            .values()
            .max_by(|a, b| {
                a.profit_percent
                    .partial_cmp(&b.profit_percent)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned())
    }

    async fn cleanup_old_data(&self) -> Result<CleanupReport> {
        let now = now_ms();
        let mut inner = self.inner.write();
        let mut report = CleanupReport::default();

        // Opportunities past the retention window
        let retention_cutoff = now - self.policy.opportunity_retention_secs * 1000;
        let expired: Vec<(i64, String)> = inner
            .index
            .range(..(retention_cutoff, String::new()))
            .map(|(k, ())| k.clone())
            .collect();
        for key in expired {
            inner.index.remove(&key);
            inner.active.remove(&key.1);
            report.removed_opportunities += 1;
        }
        inner
            .history
            .retain(|record| record.timestamp_ms >= retention_cutoff);

        // Prices: BOTH long-offline exchange AND old price. One condition
        // alone is never enough: transient outages must not discard data.
        let offline_cutoff_secs = self.policy.offline_cleanup_secs;
        let age_cutoff_ms = self.policy.price_age_cleanup_secs * 1000;
        let doomed: Vec<(ExchangeId, String)> = inner
            .prices
            .iter()
            .filter(|((exchange, _), price)| {
                let offline_secs = inner
                    .heartbeats
                    .get(exchange)
                    .map(|hb| (now - hb.last_heartbeat_ms) / 1000)
                    .unwrap_or(i64::MAX);
                offline_secs > offline_cutoff_secs && now - price.observed_at_ms > age_cutoff_ms
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            inner.prices.remove(&key);
            report.removed_prices += 1;
        }

        Ok(report)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
