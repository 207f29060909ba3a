//! Worker orchestrator
//!
//! Supervises one worker per exchange plus the calculator pool, the
//! cleanup sweep, and the monitor loop. Failure budgets are two-tier:
//! a reconnection burst retries with exponential backoff up to
//! `max_connect_retries`, and a worker that exhausts `max_failures`
//! bursts stops permanently while the rest of the system keeps running.

use crate::core::ExchangeId;
use crate::engine::calculator::{ArbitrageCalculator, PairMap};
use crate::exchanges::ExchangeConnector;
use crate::infrastructure::config::Settings;
use crate::infrastructure::{MetricsCollector, Publisher};
use crate::store::StateStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Orchestrates connectors, calculators, and maintenance loops
pub struct Orchestrator {
    settings: Settings,
    store: Arc<dyn StateStore>,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<MetricsCollector>,
    pair_map: Arc<PairMap>,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Completes when shutdown is signalled (or the orchestrator is gone)
///
/// Every loop races its tick or sleep against this, so shutdown never
/// waits out a maintenance interval or a retry backoff.
async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

impl Orchestrator {
    pub fn new(
        settings: Settings,
        store: Arc<dyn StateStore>,
        publisher: Arc<dyn Publisher>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        // The map covers every exchange, not just locally enabled ones:
        // with a shared redis store, prices from another process's
        // connectors are still evaluated here
        let pair_map = Arc::new(PairMap::from_settings(&settings.pairs, &ExchangeId::ALL));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            settings,
            store,
            publisher,
            metrics,
            pair_map,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// Start all workers and maintenance loops
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown_tx.send_replace(false);
        if self.pair_map.is_empty() {
            tracing::warn!("no pairs configured; connectors will have nothing to subscribe");
        }

        for exchange in self.settings.enabled_exchanges() {
            let symbols = self.pair_map.symbols_for(exchange);
            let worker = ExchangeWorker {
                exchange,
                symbols,
                store: self.store.clone(),
                publisher: self.publisher.clone(),
                metrics: self.metrics.clone(),
                settings: self.settings.clone(),
                running: self.running.clone(),
                shutdown: self.shutdown_tx.subscribe(),
            };
            self.tasks.push(tokio::spawn(worker.run()));
        }

        for worker_id in 0..self.settings.calculator.workers {
            let calculator = ArbitrageCalculator::new(
                self.store.clone(),
                self.publisher.clone(),
                self.metrics.clone(),
                self.pair_map.clone(),
                Duration::from_millis(self.settings.calculator.interval_ms),
                self.settings.calculator.publish_limit,
            );
            let running = self.running.clone();
            let shutdown = self.shutdown_tx.subscribe();
            self.tasks.push(tokio::spawn(async move {
                tracing::info!(worker_id, "calculator worker started");
                calculator.run(running, shutdown).await;
            }));
        }

        self.tasks.push(tokio::spawn(cleanup_loop(
            self.store.clone(),
            self.running.clone(),
            Duration::from_secs(self.settings.orchestrator.cleanup_interval_secs),
            self.shutdown_tx.subscribe(),
        )));

        self.tasks.push(tokio::spawn(monitor_loop(
            self.store.clone(),
            self.metrics.clone(),
            self.running.clone(),
            Duration::from_secs(self.settings.orchestrator.monitor_interval_secs),
            self.shutdown_tx.subscribe(),
        )));

        tracing::info!(
            exchanges = self.settings.exchanges.enabled.len(),
            calculators = self.settings.calculator.workers,
            "orchestrator started"
        );
    }

    /// Stop everything, exactly once
    ///
    /// Clears the running flag, signals every loop out of its current
    /// tick or sleep, waits for workers to wind down their connectors,
    /// then closes the store. A second call is a no-op.
    pub async fn shutdown(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::info!("shutting down");
        self.shutdown_tx.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "worker task panicked");
                }
            }
        }
        if let Err(e) = self.store.close().await {
            tracing::warn!(error = %e, "store close failed");
        }
        tracing::info!("shutdown complete");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// One supervised connector worker
struct ExchangeWorker {
    exchange: ExchangeId,
    symbols: Vec<String>,
    store: Arc<dyn StateStore>,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<MetricsCollector>,
    settings: Settings,
    running: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
}

impl ExchangeWorker {
    async fn run(self) {
        let mut shutdown = self.shutdown.clone();
        let mut connector = ExchangeConnector::new(
            self.exchange,
            self.store.clone(),
            self.publisher.clone(),
            self.metrics.clone(),
            &self.settings.connector,
            self.settings.endpoint_override(self.exchange),
        );
        let mut failures = 0u32;
        let max_failures = self.settings.orchestrator.max_failures;
        let check_interval =
            Duration::from_secs(self.settings.connector.health_check_interval_secs.max(1));

        while self.running.load(Ordering::Acquire) {
            if failures >= max_failures {
                tracing::error!(
                    exchange = %self.exchange,
                    failures,
                    "failure budget exhausted; worker stopping permanently"
                );
                break;
            }

            if !connector.state().has_transport() {
                if !self.connect_with_retries(&mut connector, &mut shutdown).await {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    failures += 1;
                    self.metrics.record_reconnect(self.exchange);
                    continue;
                }
                let sent = connector.subscribe_symbols(&self.symbols).await;
                if !self.symbols.is_empty() && sent == 0 {
                    tracing::warn!(exchange = %self.exchange, "no subscriptions went out");
                    failures += 1;
                    connector.disconnect().await;
                    continue;
                }
            } else if !connector.is_healthy() {
                tracing::warn!(exchange = %self.exchange, "connection unhealthy; reconnecting");
                failures += 1;
                self.metrics.record_reconnect(self.exchange);
                connector.disconnect().await;
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(check_interval) => {}
                _ = wait_shutdown(&mut shutdown) => break,
            }
        }

        connector.disconnect().await;
        tracing::info!(exchange = %self.exchange, "worker stopped");
    }

    /// One reconnection burst: exponential backoff between attempts
    ///
    /// Returns false when the burst is exhausted (one failure against
    /// the worker's budget) or shutdown is requested mid-burst.
    async fn connect_with_retries(
        &self,
        connector: &mut ExchangeConnector,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let max_retries = self.settings.orchestrator.max_connect_retries;
        for attempt in 0..max_retries {
            if !self.running.load(Ordering::Acquire) {
                return false;
            }
            match connector.connect().await {
                Ok(()) => return true,
                Err(e) => {
                    let backoff = Duration::from_secs(1u64 << attempt.min(6));
                    tracing::warn!(
                        exchange = %self.exchange,
                        attempt = attempt + 1,
                        max_retries,
                        error = %e,
                        backoff_secs = backoff.as_secs(),
                        "connect failed"
                    );
                    if attempt + 1 < max_retries {
                        tokio::select! {
                            _ = tokio::time::sleep(backoff) => {}
                            _ = wait_shutdown(shutdown) => return false,
                        }
                    }
                }
            }
        }
        false
    }
}

/// Periodic conjunctive cleanup of stale data
async fn cleanup_loop(
    store: Arc<dyn StateStore>,
    running: Arc<AtomicBool>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // immediate first tick, skip it
    while running.load(Ordering::Acquire) {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wait_shutdown(&mut shutdown) => break,
        }
        if !running.load(Ordering::Acquire) {
            break;
        }
        match store.cleanup_old_data().await {
            Ok(report) => {
                if report.removed_prices > 0 || report.removed_opportunities > 0 {
                    tracing::info!(
                        removed_prices = report.removed_prices,
                        removed_opportunities = report.removed_opportunities,
                        "cleanup sweep"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "cleanup sweep failed"),
        }
    }
}

/// Periodic status logging
async fn monitor_loop(
    store: Arc<dyn StateStore>,
    metrics: Arc<MetricsCollector>,
    running: Arc<AtomicBool>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    while running.load(Ordering::Acquire) {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wait_shutdown(&mut shutdown) => break,
        }
        if !running.load(Ordering::Acquire) {
            break;
        }
        let snapshot = metrics.snapshot();
        for exchange in ExchangeId::ALL {
            let i = exchange.index();
            tracing::info!(
                exchange = %exchange,
                state = %snapshot.states[i],
                messages = snapshot.messages[i],
                decode_errors = snapshot.decode_errors[i],
                reconnects = snapshot.reconnects[i],
                "exchange status"
            );
        }
        match store.get_exchange_connection_status().await {
            Ok(statuses) => {
                for status in statuses {
                    tracing::info!(
                        exchange = %status.exchange,
                        status = ?status.status,
                        heartbeats = status.heartbeat_count,
                        seconds_since_heartbeat = ?status.seconds_since_heartbeat,
                        "store heartbeat status"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "status read failed"),
        }
        let count = store.get_opportunities_count().await.unwrap_or(0);
        let highest = store.get_highest_profit_opportunity().await.ok().flatten();
        tracing::info!(
            active_opportunities = count,
            detected_total = snapshot.opportunities_detected,
            calc_cycles = snapshot.calc_cycles,
            uptime_secs = snapshot.uptime_seconds,
            highest_profit_percent = highest.map(|o| o.profit_percent),
            "screener status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::NullPublisher;
    use crate::store::{MemoryStore, StorePolicy};

    fn orchestrator(settings: Settings) -> Orchestrator {
        Orchestrator::new(
            settings,
            Arc::new(MemoryStore::new(StorePolicy::default())),
            Arc::new(NullPublisher),
            Arc::new(MetricsCollector::new()),
        )
    }

    #[tokio::test]
    async fn test_shutdown_before_start_is_noop() {
        let mut orch = orchestrator(Settings::default());
        assert!(!orch.is_running());
        orch.shutdown().await;
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn test_start_and_shutdown_once() {
        let mut settings = Settings::default();
        // No exchanges: only calculators and maintenance loops spawn
        settings.exchanges.enabled.clear();
        settings.calculator.interval_ms = 10;

        let mut orch = orchestrator(settings);
        orch.start();
        assert!(orch.is_running());
        // second start is a no-op
        orch.start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        orch.shutdown().await;
        assert!(!orch.is_running());
        assert!(orch.tasks.is_empty());

        // second shutdown is a no-op
        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_does_not_wait_out_maintenance_intervals() {
        let mut settings = Settings::default();
        settings.exchanges.enabled.clear();
        // Default cleanup (300s) and monitor (60s) intervals stay in
        // place; shutdown must interrupt their ticks, not sit them out
        let mut orch = orchestrator(settings);
        orch.start();
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(3), orch.shutdown())
            .await
            .expect("shutdown blocked on a maintenance tick");
        assert!(!orch.is_running());
        assert!(orch.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_calculators_run_against_store() {
        use crate::infrastructure::config::PairSettings;

        let store = Arc::new(MemoryStore::new(StorePolicy::default()));
        store
            .save_price(ExchangeId::Binance, "BTCUSDT", 99.0, 100.0, 5.0, 5.0)
            .await
            .unwrap();
        store
            .save_price(ExchangeId::Bybit, "BTCUSDT", 102.0, 102.1, 5.0, 5.0)
            .await
            .unwrap();

        let mut settings = Settings::default();
        // No connector workers; prices are seeded directly
        settings.exchanges.enabled.clear();
        settings.calculator.interval_ms = 10;
        settings.calculator.workers = 2;
        settings.pairs = vec![PairSettings {
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
            enabled: true,
            threshold_percent: 0.5,
            min_volume: 0.0,
            max_volume: 0.0,
            symbols: Default::default(),
            overrides: Default::default(),
        }];

        let mut orch = Orchestrator::new(
            settings,
            store.clone(),
            Arc::new(NullPublisher),
            Arc::new(MetricsCollector::new()),
        );
        orch.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        orch.shutdown().await;

        // Two concurrent calculators deduplicate to one active record
        assert_eq!(store.get_opportunities_count().await.unwrap(), 1);
        let best = store.get_highest_profit_opportunity().await.unwrap().unwrap();
        assert_eq!(best.buy_exchange, ExchangeId::Binance);
        assert_eq!(best.sell_exchange, ExchangeId::Bybit);
    }
}
