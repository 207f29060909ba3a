//! Metrics collection for system monitoring
//!
//! Lock-free counters using atomic operations, updated from the message
//! path and sampled by the monitor loop. One slot per exchange, indexed
//! by `ExchangeId::index()`.

use crate::core::{ConnectorState, ExchangeId};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

const EXCHANGE_COUNT: usize = ExchangeId::ALL.len();

/// System metrics collector
pub struct MetricsCollector {
    /// Ticker updates accepted per exchange
    messages: [AtomicU64; EXCHANGE_COUNT],
    /// Frames dropped as undecodable per exchange
    decode_errors: [AtomicU64; EXCHANGE_COUNT],
    /// Reconnection bursts triggered per exchange
    reconnects: [AtomicU64; EXCHANGE_COUNT],
    /// Current connector state per exchange
    states: [AtomicU8; EXCHANGE_COUNT],
    /// Opportunities detected (created + refreshed)
    opportunities_detected: AtomicU64,
    /// Calculator evaluation cycles completed
    calc_cycles: AtomicU64,
    start_time: Instant,
}

/// Point-in-time snapshot for logging/export
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub messages: [u64; EXCHANGE_COUNT],
    pub decode_errors: [u64; EXCHANGE_COUNT],
    pub reconnects: [u64; EXCHANGE_COUNT],
    pub states: [ConnectorState; EXCHANGE_COUNT],
    pub total_messages: u64,
    pub opportunities_detected: u64,
    pub calc_cycles: u64,
    pub uptime_seconds: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            messages: Default::default(),
            decode_errors: Default::default(),
            reconnects: Default::default(),
            states: Default::default(),
            opportunities_detected: AtomicU64::new(0),
            calc_cycles: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record one accepted ticker update
    #[inline]
    pub fn record_message(&self, exchange: ExchangeId) {
        self.messages[exchange.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Record one undecodable frame
    #[inline]
    pub fn record_decode_error(&self, exchange: ExchangeId) {
        self.decode_errors[exchange.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Record one reconnection burst
    pub fn record_reconnect(&self, exchange: ExchangeId) {
        self.reconnects[exchange.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Publish a connector state transition
    pub fn set_state(&self, exchange: ExchangeId, state: ConnectorState) {
        self.states[exchange.index()].store(state.as_u8(), Ordering::Relaxed);
    }

    /// Record opportunities detected in one cycle
    #[inline]
    pub fn record_opportunities(&self, count: u64) {
        self.opportunities_detected.fetch_add(count, Ordering::Relaxed);
        self.calc_cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut messages = [0u64; EXCHANGE_COUNT];
        let mut decode_errors = [0u64; EXCHANGE_COUNT];
        let mut reconnects = [0u64; EXCHANGE_COUNT];
        let mut states = [ConnectorState::Disconnected; EXCHANGE_COUNT];
        for i in 0..EXCHANGE_COUNT {
            messages[i] = self.messages[i].load(Ordering::Relaxed);
            decode_errors[i] = self.decode_errors[i].load(Ordering::Relaxed);
            reconnects[i] = self.reconnects[i].load(Ordering::Relaxed);
            states[i] = ConnectorState::from_u8(self.states[i].load(Ordering::Relaxed));
        }
        MetricsSnapshot {
            messages,
            decode_errors,
            reconnects,
            states,
            total_messages: messages.iter().sum(),
            opportunities_detected: self.opportunities_detected.load(Ordering::Relaxed),
            calc_cycles: self.calc_cycles.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_exchange_counters() {
        let metrics = MetricsCollector::new();
        metrics.record_message(ExchangeId::Binance);
        metrics.record_message(ExchangeId::Binance);
        metrics.record_message(ExchangeId::Htx);
        metrics.record_decode_error(ExchangeId::Mexc);

        let snap = metrics.snapshot();
        assert_eq!(snap.messages[ExchangeId::Binance.index()], 2);
        assert_eq!(snap.messages[ExchangeId::Htx.index()], 1);
        assert_eq!(snap.total_messages, 3);
        assert_eq!(snap.decode_errors[ExchangeId::Mexc.index()], 1);
    }

    #[test]
    fn test_state_roundtrip() {
        let metrics = MetricsCollector::new();
        metrics.set_state(ExchangeId::Coindcx, ConnectorState::Degraded);
        let snap = metrics.snapshot();
        assert_eq!(snap.states[ExchangeId::Coindcx.index()], ConnectorState::Degraded);
        assert_eq!(snap.states[ExchangeId::Binance.index()], ConnectorState::Disconnected);
    }

    #[test]
    fn test_opportunity_cycle_counters() {
        let metrics = MetricsCollector::new();
        metrics.record_opportunities(3);
        metrics.record_opportunities(0);
        let snap = metrics.snapshot();
        assert_eq!(snap.opportunities_detected, 3);
        assert_eq!(snap.calc_cycles, 2);
    }
}
