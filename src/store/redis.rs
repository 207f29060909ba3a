//! Redis store backend
//!
//! Shared-deployment backend: several processes (or a dashboard) can read
//! the same state. Uses a `ConnectionManager` for automatic reconnection.
//!
//! Key layout:
//! - `price:{exchange}:{symbol}`   JSON PriceRecord, no expiry
//! - `price:index`                 set of `{exchange}:{symbol}` members
//! - `heartbeat:{exchange}`        JSON HeartbeatRecord, no expiry
//! - `heartbeat:index`             set of exchange names
//! - `opp:{composite_key}`         JSON OpportunityRecord (active set)
//! - `opp:by_time`                 zset composite_key -> last_seen_ms
//! - `opp:history`                 list of JSON detection copies
//!
//! The price+heartbeat batch goes through one MULTI/EXEC pipeline so
//! readers observe it atomically. The heartbeat counter increment is a
//! read-modify-write, safe because each exchange has exactly one writer.

use super::{
    classify_status, classify_validity, CleanupReport, Result, SaveOutcome, StateStore,
    StoreError, StorePolicy,
};
use crate::core::{
    now_ms, ExchangeConnectionStatus, ExchangeId, HeartbeatRecord, OpportunityRecord,
    PriceRecord, ValidatedPrice,
};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::str::FromStr;

/// Bound kept on the history list; retention cleanup handles the rest
const HISTORY_MAX_LEN: isize = 100_000;

/// Redis-backed state store
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    policy: StorePolicy,
}

impl RedisStore {
    /// Connect to redis and build the store
    pub async fn connect(redis_url: &str, policy: StorePolicy) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        tracing::info!(url = redis_url, "redis store connected");
        Ok(Self { manager, policy })
    }

    fn price_key(exchange: ExchangeId, symbol: &str) -> String {
        format!("price:{}:{}", exchange, symbol)
    }

    fn heartbeat_key(exchange: ExchangeId) -> String {
        format!("heartbeat:{exchange}")
    }

    fn opp_key(composite_key: &str) -> String {
        format!("opp:{composite_key}")
    }

    /// Heartbeats for all exchanges in the heartbeat index
    async fn load_heartbeats(&self) -> Result<HashMap<ExchangeId, HeartbeatRecord>> {
        let mut conn = self.manager.clone();
        let members: Vec<String> = conn.smembers("heartbeat:index").await?;

        let mut out = HashMap::with_capacity(members.len());
        for name in members {
            let Ok(exchange) = ExchangeId::from_str(&name) else {
                tracing::warn!(exchange = %name, "unknown exchange in heartbeat index");
                continue;
            };
            let raw: Option<String> = conn.get(Self::heartbeat_key(exchange)).await?;
            if let Some(raw) = raw {
                let hb: HeartbeatRecord = serde_json::from_str(&raw)?;
                out.insert(exchange, hb);
            }
        }
        Ok(out)
    }

    /// Active opportunity records for the given composite keys
    async fn load_opportunities(&self, keys: &[String]) -> Result<Vec<OpportunityRecord>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.manager.clone();
        let full_keys: Vec<String> = keys.iter().map(|k| Self::opp_key(k)).collect();
        let raw: Vec<Option<String>> = conn.mget(&full_keys).await?;

        let mut out = Vec::with_capacity(keys.len());
        for value in raw.into_iter().flatten() {
            out.push(serde_json::from_str(&value)?);
        }
        Ok(out)
    }
}

#[async_trait]
impl StateStore for RedisStore {
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
        let mut conn = self.manager.clone();

        let record = PriceRecord {
            exchange,
            symbol: symbol.to_string(),
            bid_price: bid,
            ask_price: ask,
            bid_volume,
            ask_volume,
            observed_at_ms: now,
        };

        let previous: Option<String> = conn.get(Self::heartbeat_key(exchange)).await?;
        let heartbeat = match previous.and_then(|raw| serde_json::from_str::<HeartbeatRecord>(&raw).ok()) {
            Some(mut hb) => {
                hb.last_heartbeat_ms = now;
                hb.heartbeat_count += 1;
                hb
            }
            None => HeartbeatRecord {
                exchange,
                last_heartbeat_ms: now,
                heartbeat_count: 1,
                connection_start_ms: now,
            },
        };

        redis::pipe()
            .atomic()
            .set(Self::price_key(exchange, symbol), serde_json::to_string(&record)?)
            .ignore()
            .sadd("price:index", format!("{exchange}:{symbol}"))
            .ignore()
            .set(Self::heartbeat_key(exchange), serde_json::to_string(&heartbeat)?)
            .ignore()
            .sadd("heartbeat:index", exchange.as_str())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn get_all_prices(&self) -> Result<Vec<ValidatedPrice>> {
        let now = now_ms();
        let mut conn = self.manager.clone();
        let heartbeats = self.load_heartbeats().await?;

        let members: Vec<String> = conn.smembers("price:index").await?;
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = members.iter().map(|m| format!("price:{m}")).collect();
        let raw: Vec<Option<String>> = conn.mget(&keys).await?;

        let mut out = Vec::with_capacity(raw.len());
        for value in raw.into_iter().flatten() {
            let record: PriceRecord = serde_json::from_str(&value)?;
            let (is_valid, reason, seconds_since_heartbeat) =
                classify_validity(now, heartbeats.get(&record.exchange), &self.policy);
            out.push(ValidatedPrice {
                record,
                is_valid,
                reason,
                seconds_since_heartbeat,
            });
        }
        Ok(out)
    }

    async fn get_exchange_connection_status(&self) -> Result<Vec<ExchangeConnectionStatus>> {
        let now = now_ms();
        let mut conn = self.manager.clone();
        let heartbeats = self.load_heartbeats().await?;

        let mut exchanges: Vec<ExchangeId> = heartbeats.keys().copied().collect();
        let price_members: Vec<String> = conn.smembers("price:index").await?;
        for member in price_members {
            if let Some(exchange) = member
                .split(':')
                .next()
                .and_then(|name| ExchangeId::from_str(name).ok())
            {
                if !exchanges.contains(&exchange) {
                    exchanges.push(exchange);
                }
            }
        }

        let mut out = Vec::with_capacity(exchanges.len());
        for exchange in exchanges {
            let heartbeat = heartbeats.get(&exchange);
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
        let mut conn = self.manager.clone();
        let key = record.composite_key.clone();
        let opp_key = Self::opp_key(&key);

        let existing: Option<String> = conn.get(&opp_key).await?;
        if let Some(raw) = existing {
            let mut active: OpportunityRecord = serde_json::from_str(&raw)?;
            active.seen_count += 1;
            active.last_seen_ms = record.timestamp_ms;
            active.timestamp_ms = record.timestamp_ms;
            let id = active.id.clone();

            redis::pipe()
                .atomic()
                .set(&opp_key, serde_json::to_string(&active)?)
                .ignore()
                .zadd("opp:by_time", &key, active.last_seen_ms)
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await?;
            return Ok(SaveOutcome::Updated(id));
        }

        record.id = uuid::Uuid::new_v4().to_string();
        record.first_seen_ms = record.timestamp_ms;
        record.last_seen_ms = record.timestamp_ms;
        record.seen_count = 1;
        let id = record.id.clone();
        let json = serde_json::to_string(&record)?;

        redis::pipe()
            .atomic()
            .set(&opp_key, &json)
            .ignore()
            .zadd("opp:by_time", &key, record.last_seen_ms)
            .ignore()
            .lpush("opp:history", &json)
            .ignore()
            .ltrim("opp:history", 0, HISTORY_MAX_LEN - 1)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        // Trim the active set to its cap, oldest first
        let count: u64 = conn.zcard("opp:by_time").await?;
        let excess = count.saturating_sub(self.policy.max_active_opportunities as u64);
        if excess > 0 {
            let oldest: Vec<String> = conn.zrange("opp:by_time", 0, excess as isize - 1).await?;
            if !oldest.is_empty() {
                let mut pipe = redis::pipe();
                pipe.atomic();
                for stale in &oldest {
                    pipe.del(Self::opp_key(stale)).ignore();
                    pipe.zrem("opp:by_time", stale).ignore();
                }
                pipe.query_async::<_, ()>(&mut conn).await?;
            }
        }

        Ok(SaveOutcome::Created(id))
    }

    async fn get_latest_opportunities(&self, limit: usize) -> Result<Vec<OpportunityRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn
            .zrevrange("opp:by_time", 0, limit as isize - 1)
            .await?;
        self.load_opportunities(&keys).await
    }

    async fn get_opportunities_count(&self) -> Result<u64> {
        let mut conn = self.manager.clone();
        Ok(conn.zcard("opp:by_time").await?)
    }

    async fn get_highest_profit_opportunity(&self) -> Result<Option<OpportunityRecord>> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn.zrange("opp:by_time", 0, -1).await?;
        let records = self.load_opportunities(&keys).await?;
        Ok(records.into_iter().max_by(|a, b| {
            a.profit_percent
                .partial_cmp(&b.profit_percent)
                .unwrap_or(std::cmp::Ordering::Equal)
        }))
    }

    async fn cleanup_old_data(&self) -> Result<CleanupReport> {
        let now = now_ms();
        let mut conn = self.manager.clone();
        let mut report = CleanupReport::default();

        // Opportunities past the retention window
        let retention_cutoff = now - self.policy.opportunity_retention_secs * 1000;
        let expired: Vec<String> = conn
            .zrangebyscore("opp:by_time", i64::MIN, retention_cutoff)
            .await?;
        if !expired.is_empty() {
            let mut pipe = redis::pipe();
            pipe.atomic();
            for key in &expired {
                pipe.del(Self::opp_key(key)).ignore();
                pipe.zrem("opp:by_time", key).ignore();
            }
            pipe.query_async::<_, ()>(&mut conn).await?;
            report.removed_opportunities = expired.len();
        }

        // Prices: conjunctive check, offline duration AND price age
        let heartbeats = self.load_heartbeats().await?;
        let members: Vec<String> = conn.smembers("price:index").await?;
        for member in members {
            let price_key = format!("price:{member}");
            let raw: Option<String> = conn.get(&price_key).await?;
            let Some(raw) = raw else {
                let _: () = conn.srem("price:index", &member).await?;
                continue;
            };
            let record: PriceRecord = serde_json::from_str(&raw)?;
            let offline_secs = heartbeats
                .get(&record.exchange)
                .map(|hb| (now - hb.last_heartbeat_ms) / 1000)
                .unwrap_or(i64::MAX);
            let age_ms = now - record.observed_at_ms;
            if offline_secs > self.policy.offline_cleanup_secs
                && age_ms > self.policy.price_age_cleanup_secs * 1000
            {
                redis::pipe()
                    .atomic()
                    .del(&price_key)
                    .ignore()
                    .srem("price:index", &member)
                    .ignore()
                    .query_async::<_, ()>(&mut conn)
                    .await?;
                report.removed_prices += 1;
            }
        }

        Ok(report)
    }

    async fn close(&self) -> Result<()> {
        // ConnectionManager has no explicit close; dropping the last clone
        // tears the connection down
        Ok(())
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
