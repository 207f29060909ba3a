//! Arbitrage opportunity records and decimal helpers
//!
//! Opportunities are deduplicated across detection cycles by a composite
//! key hashed over their defining fields at fixed decimal precision. All
//! profit/threshold arithmetic runs on `rust_decimal` so gating never
//! trips over binary float rounding.

use super::ExchangeId;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Decimal precision used for composite keys and gating comparisons
pub const KEY_PRECISION: u32 = 8;

/// A detected cross-exchange arbitrage opportunity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    /// Store-assigned id, stable for the lifetime of the active record
    pub id: String,
    /// Dedup key over (buy ex, sell ex, pair, prices, volumes)
    pub composite_key: String,
    pub buy_exchange: ExchangeId,
    pub sell_exchange: ExchangeId,
    pub base_currency: String,
    pub quote_currency: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub profit_percent: f64,
    pub volume: f64,
    /// Detection time of the most recent sighting (unix millis)
    pub timestamp_ms: i64,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
    pub seen_count: u64,
}

impl OpportunityRecord {
    /// Pair key in canonical form, e.g. "BTC/USDT"
    pub fn pair_key(&self) -> String {
        format!("{}/{}", self.base_currency, self.quote_currency)
    }
}

/// Convert a transport float to the fixed-precision decimal used for gating
///
/// Rounding to [`KEY_PRECISION`] places strips the binary expansion noise a
/// double carries (100.1f64 is 100.09999999...), so equality and threshold
/// comparisons behave like the decimal literals the operator configured.
#[inline]
pub fn dec(v: f64) -> Decimal {
    Decimal::from_f64_retain(v)
        .unwrap_or(Decimal::ZERO)
        .round_dp(KEY_PRECISION)
}

/// Profit of buying at `buy` and selling at `sell`, in percent
///
/// Returns None when the trade is not profitable or `buy` is not positive.
#[inline]
pub fn profit_percent(buy: Decimal, sell: Decimal) -> Option<Decimal> {
    if buy <= Decimal::ZERO || sell <= buy {
        return None;
    }
    Some((sell - buy) / buy * Decimal::from(100))
}

/// Round a decimal percentage for presentation (2 dp) as f64
#[inline]
pub fn display_percent(d: Decimal) -> f64 {
    d.round_dp(2).to_f64().unwrap_or(0.0)
}

/// Stable composite key for opportunity deduplication
///
/// Hashes the defining fields at fixed precision; identical opportunities
/// re-detected across polling cycles produce the same key, while changing
/// any single field yields a new one.
pub fn composite_key(
    buy_exchange: ExchangeId,
    sell_exchange: ExchangeId,
    pair_key: &str,
    buy_price: f64,
    sell_price: f64,
    buy_volume: f64,
    sell_volume: f64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(buy_exchange.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(sell_exchange.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(pair_key.as_bytes());
    for value in [buy_price, sell_price, buy_volume, sell_volume] {
        hasher.update(b":");
        hasher.update(dec(value).normalize().to_string().as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dec_strips_float_noise() {
        // 100.1 is not representable in binary; gating must still see 100.1
        assert_eq!(dec(100.1), Decimal::new(1001, 1));
        assert_eq!(dec(0.1) + dec(0.2), Decimal::new(3, 1));
    }

    #[test]
    fn test_profit_percent_exact() {
        let profit = profit_percent(dec(100.0), dec(105.0)).unwrap();
        assert_eq!(profit, Decimal::from(5));
        assert_eq!(display_percent(profit), 5.0);
    }

    #[test]
    fn test_profit_percent_rejects_unprofitable() {
        assert!(profit_percent(dec(100.0), dec(100.0)).is_none());
        assert!(profit_percent(dec(100.0), dec(99.0)).is_none());
        assert!(profit_percent(dec(0.0), dec(1.0)).is_none());
    }

    #[test]
    fn test_threshold_comparison_no_false_negative() {
        // profit of exactly 0.1% must pass a 0.1% threshold even though
        // neither side is binary-exact as f64
        let profit = profit_percent(dec(100.0), dec(100.1)).unwrap();
        let threshold = dec(0.1);
        assert!(profit >= threshold);
    }

    #[test]
    fn test_composite_key_stable_across_cycles() {
        let a = composite_key(
            ExchangeId::Binance,
            ExchangeId::Bybit,
            "BTC/USDT",
            100.0,
            105.0,
            1.5,
            2.0,
        );
        let b = composite_key(
            ExchangeId::Binance,
            ExchangeId::Bybit,
            "BTC/USDT",
            100.0,
            105.0,
            1.5,
            2.0,
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_composite_key_sensitive_to_each_field() {
        let base = composite_key(
            ExchangeId::Binance,
            ExchangeId::Bybit,
            "BTC/USDT",
            100.0,
            105.0,
            1.5,
            2.0,
        );
        let variants = [
            composite_key(ExchangeId::Bybit, ExchangeId::Binance, "BTC/USDT", 100.0, 105.0, 1.5, 2.0),
            composite_key(ExchangeId::Binance, ExchangeId::Bybit, "ETH/USDT", 100.0, 105.0, 1.5, 2.0),
            composite_key(ExchangeId::Binance, ExchangeId::Bybit, "BTC/USDT", 100.5, 105.0, 1.5, 2.0),
            composite_key(ExchangeId::Binance, ExchangeId::Bybit, "BTC/USDT", 100.0, 105.5, 1.5, 2.0),
            composite_key(ExchangeId::Binance, ExchangeId::Bybit, "BTC/USDT", 100.0, 105.0, 1.6, 2.0),
            composite_key(ExchangeId::Binance, ExchangeId::Bybit, "BTC/USDT", 100.0, 105.0, 1.5, 2.5),
        ];
        for variant in variants {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn test_composite_key_ignores_sub_precision_jitter() {
        let a = composite_key(
            ExchangeId::Binance,
            ExchangeId::Bybit,
            "BTC/USDT",
            100.1,
            105.0,
            1.0,
            1.0,
        );
        let b = composite_key(
            ExchangeId::Binance,
            ExchangeId::Bybit,
            "BTC/USDT",
            100.100000000001,
            105.0,
            1.0,
            1.0,
        );
        assert_eq!(a, b);
    }
}
