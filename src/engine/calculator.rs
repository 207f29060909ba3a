//! Arbitrage calculator
//!
//! Periodically evaluates every ordered exchange pair per monitored
//! currency pair against valid prices from the store. All gating runs on
//! `rust_decimal` at fixed precision, so a configured threshold of 0.5
//! means exactly 0.5 and boundary cases land on the configured side.
//!
//! Several calculator workers can run concurrently against one store;
//! the composite-key dedup in `save_opportunity` absorbs the overlap.

use crate::core::opportunity::display_percent;
use crate::core::{
    composite_key, dec, now_ms, CurrencyPair, ExchangeId, OpportunityRecord, ValidatedPrice,
};
use crate::infrastructure::config::PairSettings;
use crate::infrastructure::{MetricsCollector, Publisher};
use crate::store::{StateStore, StoreError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Gating rule for one currency pair on one exchange
///
/// Built from the pair-level configuration with any per-exchange
/// overrides applied; the two sides of a detection may carry different
/// rules.
#[derive(Debug, Clone)]
pub struct PairRule {
    pub pair: CurrencyPair,
    /// Minimum profit percent; detections exactly at the threshold pass
    pub threshold_percent: Decimal,
    /// Minimum executable volume, zero disables the floor
    pub min_volume: Decimal,
    /// Maximum executable volume, zero disables the cap
    pub max_volume: Decimal,
}

/// Resolves exchange-native symbols to their pair rule
///
/// Each enabled exchange maps its own symbol spelling (BTCUSDT, btcusdt,
/// B-BTC_USDT) to the one canonical rule for the pair.
#[derive(Debug, Clone, Default)]
pub struct PairMap {
    by_symbol: HashMap<(ExchangeId, String), Arc<PairRule>>,
}

impl PairMap {
    /// Build the map from configuration for the given exchanges
    pub fn from_settings(pairs: &[PairSettings], exchanges: &[ExchangeId]) -> Self {
        let mut by_symbol = HashMap::new();
        for settings in pairs {
            if !settings.enabled {
                continue;
            }
            for &exchange in exchanges {
                let rule = Arc::new(PairRule {
                    pair: settings.pair(),
                    threshold_percent: dec(settings.threshold_for(exchange)),
                    min_volume: dec(settings.min_volume_for(exchange)),
                    max_volume: dec(settings.max_volume_for(exchange)),
                });
                by_symbol.insert((exchange, settings.symbol_for(exchange)), rule);
            }
        }
        Self { by_symbol }
    }

    pub fn resolve(&self, exchange: ExchangeId, symbol: &str) -> Option<&Arc<PairRule>> {
        self.by_symbol.get(&(exchange, symbol.to_string()))
    }

    /// Exchange-native symbols to subscribe on one exchange
    pub fn symbols_for(&self, exchange: ExchangeId) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .by_symbol
            .keys()
            .filter(|(ex, _)| *ex == exchange)
            .map(|(_, symbol)| symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}

/// One evaluation worker
pub struct ArbitrageCalculator {
    store: Arc<dyn StateStore>,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<MetricsCollector>,
    pair_map: Arc<PairMap>,
    interval: Duration,
    publish_limit: usize,
}

impl ArbitrageCalculator {
    pub fn new(
        store: Arc<dyn StateStore>,
        publisher: Arc<dyn Publisher>,
        metrics: Arc<MetricsCollector>,
        pair_map: Arc<PairMap>,
        interval: Duration,
        publish_limit: usize,
    ) -> Self {
        Self {
            store,
            publisher,
            metrics,
            pair_map,
            interval,
            publish_limit,
        }
    }

    /// Run evaluation cycles until the flag clears or shutdown is signalled
    pub async fn run(&self, running: Arc<AtomicBool>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        while running.load(Ordering::Acquire) {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
            if !running.load(Ordering::Acquire) {
                break;
            }
            match self.evaluate_once().await {
                Ok(detected) => {
                    self.metrics.record_opportunities(detected.len() as u64);
                    if !detected.is_empty() {
                        let batch: Vec<OpportunityRecord> =
                            detected.into_iter().take(self.publish_limit).collect();
                        self.publisher.publish_opportunities(batch).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "evaluation cycle failed");
                }
            }
        }
        tracing::info!("calculator worker stopped");
    }

    /// One evaluation cycle: detect, persist, return detections in order
    pub async fn evaluate_once(&self) -> Result<Vec<OpportunityRecord>, StoreError> {
        let prices = self.store.get_all_prices().await?;
        let groups = self.group_by_pair(&prices);

        let mut detected = Vec::new();
        for (pair_key, quotes) in groups {
            for (buy_idx, (buy_rule, buy_price)) in quotes.iter().enumerate() {
                for (sell_idx, (sell_rule, sell_price)) in quotes.iter().enumerate() {
                    if buy_idx == sell_idx
                        || buy_price.record.exchange == sell_price.record.exchange
                    {
                        continue;
                    }
                    if let Some(record) = evaluate_pair(
                        &pair_key,
                        buy_rule,
                        buy_price,
                        sell_rule,
                        sell_price,
                    ) {
                        detected.push(record);
                    }
                }
            }
        }

        // Persist in detection order; the store assigns stable ids
        for record in &mut detected {
            let outcome = self.store.save_opportunity(record.clone()).await?;
            record.id = outcome.id().to_string();
        }
        Ok(detected)
    }

    /// Group valid prices by canonical pair, dropping unmapped symbols
    fn group_by_pair<'a>(
        &'a self,
        prices: &'a [ValidatedPrice],
    ) -> Vec<(String, Vec<(&'a Arc<PairRule>, &'a ValidatedPrice)>)> {
        let mut groups: HashMap<String, Vec<(&Arc<PairRule>, &ValidatedPrice)>> = HashMap::new();
        for price in prices {
            if !price.is_valid {
                continue;
            }
            let Some(rule) = self
                .pair_map
                .resolve(price.record.exchange, &price.record.symbol)
            else {
                continue;
            };
            groups.entry(rule.pair.key()).or_default().push((rule, price));
        }
        let mut ordered: Vec<_> = groups.into_iter().collect();
        // Deterministic pair order; within a pair, store order is kept
        ordered.sort_by(|a, b| a.0.cmp(&b.0));
        ordered
    }
}

/// Evaluate one ordered (buy here, sell there) combination
fn evaluate_pair(
    pair_key: &str,
    buy_rule: &PairRule,
    buy: &ValidatedPrice,
    sell_rule: &PairRule,
    sell: &ValidatedPrice,
) -> Option<OpportunityRecord> {
    let buy_price = dec(buy.record.ask_price);
    let sell_price = dec(sell.record.bid_price);
    let profit = crate::core::profit_percent(buy_price, sell_price)?;

    let threshold = buy_rule.threshold_percent.min(sell_rule.threshold_percent);
    if profit < threshold {
        return None;
    }

    let available = dec(buy.record.ask_volume).min(dec(sell.record.bid_volume));
    if available <= Decimal::ZERO {
        return None;
    }
    let min_volume = buy_rule.min_volume.max(sell_rule.min_volume);
    if available < min_volume {
        return None;
    }
    let max_volume = effective_max(buy_rule.max_volume, sell_rule.max_volume);
    if max_volume > Decimal::ZERO && available > max_volume {
        return None;
    }

    let now = now_ms();
    let (base, quote) = (&buy_rule.pair.base, &buy_rule.pair.quote);
    Some(OpportunityRecord {
        id: String::new(),
        composite_key: composite_key(
            buy.record.exchange,
            sell.record.exchange,
            pair_key,
            buy.record.ask_price,
            sell.record.bid_price,
            buy.record.ask_volume,
            sell.record.bid_volume,
        ),
        buy_exchange: buy.record.exchange,
        sell_exchange: sell.record.exchange,
        base_currency: base.clone(),
        quote_currency: quote.clone(),
        buy_price: buy.record.ask_price,
        sell_price: sell.record.bid_price,
        profit_percent: display_percent(profit),
        volume: available.to_f64().unwrap_or(0.0),
        timestamp_ms: now,
        first_seen_ms: now,
        last_seen_ms: now,
        seen_count: 1,
    })
}

/// Combine two volume caps
///
/// The cap only applies when both sides configure one; a single-sided
/// max leaves the trade uncapped.
fn effective_max(a: Decimal, b: Decimal) -> Decimal {
    if a > Decimal::ZERO && b > Decimal::ZERO {
        a.min(b)
    } else {
        Decimal::ZERO
    }
}
