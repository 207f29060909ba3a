//! Shared test fixtures

use crate::core::{composite_key, now_ms, ExchangeId, OpportunityRecord, PriceRecord};

/// A plausible price record for tests
pub fn sample_price(exchange: ExchangeId, symbol: &str, bid: f64, ask: f64) -> PriceRecord {
    PriceRecord {
        exchange,
        symbol: symbol.to_string(),
        bid_price: bid,
        ask_price: ask,
        bid_volume: 5.0,
        ask_volume: 5.0,
        observed_at_ms: now_ms(),
    }
}

/// An opportunity record with a consistent composite key
pub fn sample_opportunity(
    buy_exchange: ExchangeId,
    sell_exchange: ExchangeId,
    buy_price: f64,
    sell_price: f64,
    volume: f64,
) -> OpportunityRecord {
    let now = now_ms();
    let key = composite_key(
        buy_exchange,
        sell_exchange,
        "BTC/USDT",
        buy_price,
        sell_price,
        volume,
        volume,
    );
    OpportunityRecord {
        id: String::new(),
        composite_key: key,
        buy_exchange,
        sell_exchange,
        base_currency: "BTC".to_string(),
        quote_currency: "USDT".to_string(),
        buy_price,
        sell_price,
        profit_percent: (sell_price - buy_price) / buy_price * 100.0,
        volume,
        timestamp_ms: now,
        first_seen_ms: now,
        last_seen_ms: now,
        seen_count: 1,
    }
}
