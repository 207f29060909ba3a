//! Subscription tracking
//!
//! Tracks which exchange-specific symbols a connector has subscribed to.
//! Subscribing is idempotent: already-active symbols are skipped and
//! counted as success. Cleared whenever the connector loses its transport.

use std::collections::HashMap;

/// Subscription status for a single symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Subscribe message sent
    Active,
    /// Subscribe send failed; eligible for retry on the next pass
    Failed,
}

/// Per-connector subscription tracker
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    symbols: HashMap<String, SubscriptionStatus>,
}

impl SubscriptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a subscribe for this symbol already went out
    pub fn is_active(&self, symbol: &str) -> bool {
        matches!(self.symbols.get(symbol), Some(SubscriptionStatus::Active))
    }

    pub fn mark_active(&mut self, symbol: &str) {
        self.symbols
            .insert(symbol.to_string(), SubscriptionStatus::Active);
    }

    pub fn mark_failed(&mut self, symbol: &str) {
        self.symbols
            .insert(symbol.to_string(), SubscriptionStatus::Failed);
    }

    /// Number of active subscriptions
    pub fn active_count(&self) -> usize {
        self.symbols
            .values()
            .filter(|s| **s == SubscriptionStatus::Active)
            .count()
    }

    /// Drop all subscription state (on transport loss)
    pub fn clear(&mut self) {
        self.symbols.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotent_tracking() {
        let mut tracker = SubscriptionTracker::new();
        assert!(!tracker.is_active("btcusdt"));

        tracker.mark_active("btcusdt");
        tracker.mark_active("btcusdt");
        assert!(tracker.is_active("btcusdt"));
        assert_eq!(tracker.active_count(), 1);
    }

    #[test]
    fn test_failed_symbols_not_active() {
        let mut tracker = SubscriptionTracker::new();
        tracker.mark_failed("ethusdt");
        assert!(!tracker.is_active("ethusdt"));
        assert_eq!(tracker.active_count(), 0);

        // A later retry can flip it to active
        tracker.mark_active("ethusdt");
        assert!(tracker.is_active("ethusdt"));
    }

    #[test]
    fn test_clear_on_transport_loss() {
        let mut tracker = SubscriptionTracker::new();
        tracker.mark_active("btcusdt");
        tracker.mark_active("ethusdt");
        tracker.clear();
        assert_eq!(tracker.active_count(), 0);
        assert!(!tracker.is_active("btcusdt"));
    }
}
