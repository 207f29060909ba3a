//! Downstream event publishing
//!
//! Collaborator seam between detection and delivery: connectors push
//! price updates, calculators push opportunity batches. Publishing is
//! best-effort and never blocks the caller; a slow or absent consumer
//! costs dropped events, not backpressure on the message path.

use crate::core::{now_ms, ExchangeId, OpportunityRecord, PriceRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Event stream payload
#[derive(Debug, Clone)]
pub enum ScreenerEvent {
    /// Throttled per-symbol price update
    PriceUpdate(PriceRecord),
    /// One calculator cycle's detections, in detection order
    Opportunities(Vec<OpportunityRecord>),
}

/// Publishing seam
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one price update (may be throttled away)
    async fn publish_price(&self, record: PriceRecord);

    /// Publish a batch of opportunities from one evaluation cycle
    async fn publish_opportunities(&self, records: Vec<OpportunityRecord>);
}

/// Broadcast-channel publisher with per-symbol price throttling
///
/// Prices on the same (exchange, symbol) are forwarded at most once per
/// throttle window; opportunities are always forwarded.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<ScreenerEvent>,
    throttle_ms: i64,
    last_sent: Mutex<HashMap<(ExchangeId, String), i64>>,
}

impl BroadcastPublisher {
    pub fn new(channel_capacity: usize, throttle_ms: u64) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            sender,
            throttle_ms: throttle_ms as i64,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe a consumer to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<ScreenerEvent> {
        self.sender.subscribe()
    }

    fn should_send(&self, exchange: ExchangeId, symbol: &str) -> bool {
        let now = now_ms();
        let mut last_sent = self.last_sent.lock();
        match last_sent.get_mut(&(exchange, symbol.to_string())) {
            Some(last) if now - *last < self.throttle_ms => false,
            Some(last) => {
                *last = now;
                true
            }
            None => {
                last_sent.insert((exchange, symbol.to_string()), now);
                true
            }
        }
    }
}

#[async_trait]
impl Publisher for BroadcastPublisher {
    async fn publish_price(&self, record: PriceRecord) {
        if !self.should_send(record.exchange, &record.symbol) {
            return;
        }
        // No receivers is fine, events are advisory
        let _ = self.sender.send(ScreenerEvent::PriceUpdate(record));
    }

    async fn publish_opportunities(&self, records: Vec<OpportunityRecord>) {
        if records.is_empty() {
            return;
        }
        let _ = self.sender.send(ScreenerEvent::Opportunities(records));
    }
}

/// Publisher that discards everything; used when no consumer is wired up
pub struct NullPublisher;

#[async_trait]
impl Publisher for NullPublisher {
    async fn publish_price(&self, _record: PriceRecord) {}

    async fn publish_opportunities(&self, _records: Vec<OpportunityRecord>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_opportunity;

    fn price(symbol: &str) -> PriceRecord {
        PriceRecord {
            exchange: ExchangeId::Binance,
            symbol: symbol.to_string(),
            bid_price: 100.0,
            ask_price: 100.1,
            bid_volume: 1.0,
            ask_volume: 1.0,
            observed_at_ms: now_ms(),
        }
    }

    #[tokio::test]
    async fn test_price_throttling_per_symbol() {
        let publisher = BroadcastPublisher::new(16, 60_000);
        let mut rx = publisher.subscribe();

        publisher.publish_price(price("BTCUSDT")).await;
        publisher.publish_price(price("BTCUSDT")).await; // throttled
        publisher.publish_price(price("ETHUSDT")).await; // different symbol

        assert!(matches!(rx.try_recv(), Ok(ScreenerEvent::PriceUpdate(p)) if p.symbol == "BTCUSDT"));
        assert!(matches!(rx.try_recv(), Ok(ScreenerEvent::PriceUpdate(p)) if p.symbol == "ETHUSDT"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_opportunities_always_forwarded() {
        let publisher = BroadcastPublisher::new(16, 60_000);
        let mut rx = publisher.subscribe();

        publisher.publish_opportunities(vec![]).await; // empty batch dropped
        publisher
            .publish_opportunities(vec![sample_opportunity(
                ExchangeId::Binance,
                ExchangeId::Bybit,
                100.0,
                101.0,
                1.0,
            )])
            .await;

        assert!(matches!(rx.try_recv(), Ok(ScreenerEvent::Opportunities(v)) if v.len() == 1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let publisher = BroadcastPublisher::new(16, 0);
        publisher.publish_price(price("BTCUSDT")).await;
        publisher
            .publish_opportunities(vec![sample_opportunity(
                ExchangeId::Binance,
                ExchangeId::Bybit,
                100.0,
                101.0,
                1.0,
            )])
            .await;
    }
}
