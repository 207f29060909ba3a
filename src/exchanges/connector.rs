//! Shared exchange connector
//!
//! One connector per exchange, generic over the codec: owns the WebSocket
//! transport, the subscription set, and the background units (listen,
//! keepalive, health). Protocol variance lives entirely in
//! [`ExchangeCodec`]/[`ProtocolDescriptor`]; this file is the same for
//! all five exchanges.
//!
//! Failure handling is one-directional: only the listen unit (or the
//! health unit's flow timeout) declares the connection dead. Decode
//! errors and store write errors are logged and dropped, they never kill
//! the connection.

use crate::core::{now_ms, ConnectorState, ExchangeId};
use crate::exchanges::codec::{DecodedFrame, ExchangeCodec};
use crate::exchanges::descriptor::{PingPolicy, ProtocolDescriptor};
use crate::infrastructure::{MetricsCollector, Publisher};
use crate::store::StateStore;
use crate::ws::{self, SubscriptionTracker, WsWriter};
use crate::{Result, ScreenerError};
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;

/// State shared between the connector handle and its background units
struct ConnectorShared {
    exchange: ExchangeId,
    state: AtomicU8,
    /// Unix millis of the last inbound frame of any kind
    last_inbound_ms: AtomicI64,
    connected_at_ms: AtomicI64,
    writer: Mutex<Option<WsWriter>>,
    metrics: Arc<MetricsCollector>,
}

impl ConnectorShared {
    fn state(&self) -> ConnectorState {
        ConnectorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectorState) {
        self.state.store(state.as_u8(), Ordering::Release);
        self.metrics.set_state(self.exchange, state);
    }

    #[inline]
    fn touch_inbound(&self) {
        self.last_inbound_ms.store(now_ms(), Ordering::Relaxed);
    }

    fn seconds_since_inbound(&self) -> i64 {
        (now_ms() - self.last_inbound_ms.load(Ordering::Relaxed)) / 1000
    }

    /// Declare the connection dead, exactly once
    ///
    /// The first caller wins; every background unit checks the state and
    /// exits cooperatively. Closing the writer makes the read side
    /// terminate, which unblocks the listen unit.
    async fn mark_dead(&self, reason: &str) {
        let previous = self.state.swap(ConnectorState::Dead.as_u8(), Ordering::AcqRel);
        if ConnectorState::from_u8(previous) == ConnectorState::Dead {
            return;
        }
        self.metrics.set_state(self.exchange, ConnectorState::Dead);
        tracing::warn!(exchange = %self.exchange, reason, "connection dead");
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.close().await;
        }
    }

    async fn send(&self, msg: Message) -> std::result::Result<(), ws::WsError> {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => writer.send(msg).await,
            None => Err(ws::WsError::NotConnected),
        }
    }
}

/// Connector for one exchange
///
/// Lifecycle: `connect` -> `subscribe_symbols` -> background units run
/// until the connection dies -> `disconnect` (or the orchestrator
/// observes `!is_healthy()` and reconnects from scratch).
pub struct ExchangeConnector {
    exchange: ExchangeId,
    descriptor: ProtocolDescriptor,
    codec: Arc<ExchangeCodec>,
    shared: Arc<ConnectorShared>,
    store: Arc<dyn StateStore>,
    publisher: Arc<dyn Publisher>,
    tracker: SubscriptionTracker,
    tasks: Vec<JoinHandle<()>>,
    message_flow_timeout: Duration,
    health_check_interval: Duration,
}

impl ExchangeConnector {
    pub fn new(
        exchange: ExchangeId,
        store: Arc<dyn StateStore>,
        publisher: Arc<dyn Publisher>,
        metrics: Arc<MetricsCollector>,
        settings: &crate::infrastructure::config::ConnectorSettings,
        endpoint_override: Option<&str>,
    ) -> Self {
        let mut descriptor = ProtocolDescriptor::for_exchange(exchange);
        if let Some(endpoint) = endpoint_override {
            descriptor = descriptor.with_endpoint(endpoint.to_string());
        }
        Self {
            exchange,
            descriptor,
            codec: Arc::new(ExchangeCodec::for_exchange(exchange)),
            shared: Arc::new(ConnectorShared {
                exchange,
                state: AtomicU8::new(ConnectorState::Disconnected.as_u8()),
                last_inbound_ms: AtomicI64::new(0),
                connected_at_ms: AtomicI64::new(0),
                writer: Mutex::new(None),
                metrics,
            }),
            store,
            publisher,
            tracker: SubscriptionTracker::new(),
            tasks: Vec::new(),
            message_flow_timeout: Duration::from_secs(settings.message_flow_timeout_secs),
            health_check_interval: Duration::from_secs(settings.health_check_interval_secs),
        }
    }

    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    pub fn state(&self) -> ConnectorState {
        self.shared.state()
    }

    /// Millis since the connection was established, 0 when never connected
    pub fn connected_at_ms(&self) -> i64 {
        self.shared.connected_at_ms.load(Ordering::Relaxed)
    }

    /// A healthy connection holds a transport and has seen inbound
    /// traffic within the message-flow timeout
    pub fn is_healthy(&self) -> bool {
        self.shared.state().has_transport()
            && self.shared.seconds_since_inbound() <= self.message_flow_timeout.as_secs() as i64
    }

    /// Establish the transport and start the background units
    ///
    /// On failure the connector is left in `Disconnected` with no
    /// lingering tasks; the caller owns retry policy.
    pub async fn connect(&mut self) -> Result<()> {
        self.reap_tasks().await;
        self.tracker.clear();
        self.shared.set_state(ConnectorState::Connecting);

        let (writer, reader) = match ws::connect(&self.descriptor.endpoint).await {
            Ok(halves) => halves,
            Err(e) => {
                self.shared.set_state(ConnectorState::Disconnected);
                return Err(ScreenerError::WebSocket(format!(
                    "{}: {e}",
                    self.exchange
                )));
            }
        };

        *self.shared.writer.lock().await = Some(writer);
        let now = now_ms();
        self.shared.last_inbound_ms.store(now, Ordering::Relaxed);
        self.shared.connected_at_ms.store(now, Ordering::Relaxed);
        self.shared.set_state(ConnectorState::Connected);
        tracing::info!(exchange = %self.exchange, endpoint = %self.descriptor.endpoint, "connected");

        self.tasks.push(tokio::spawn(listen_unit(
            self.shared.clone(),
            self.codec.clone(),
            self.store.clone(),
            self.publisher.clone(),
            reader,
        )));

        if let PingPolicy::ClientInitiated { interval } = self.descriptor.ping {
            self.tasks.push(tokio::spawn(ping_unit(
                self.shared.clone(),
                self.codec.clone(),
                interval,
            )));
        }

        self.tasks.push(tokio::spawn(health_unit(
            self.shared.clone(),
            self.message_flow_timeout,
            self.health_check_interval,
        )));

        Ok(())
    }

    /// Subscribe to the given exchange-native symbols
    ///
    /// Idempotent: already-active symbols are skipped. Sends are paced
    /// per the exchange's rate limit. Returns the number of symbols
    /// newly sent; a send failure marks the symbol failed and stops the
    /// batch (the connection is about to die anyway).
    pub async fn subscribe_symbols(&mut self, symbols: &[String]) -> usize {
        let mut sent = 0;
        for symbol in symbols {
            if self.tracker.is_active(symbol) {
                continue;
            }
            let payload = self.codec.build_subscribe(symbol);
            match self.shared.send(Message::text(payload)).await {
                Ok(()) => {
                    self.tracker.mark_active(symbol);
                    sent += 1;
                }
                Err(e) => {
                    self.tracker.mark_failed(symbol);
                    tracing::warn!(
                        exchange = %self.exchange,
                        symbol,
                        error = %e,
                        "subscribe send failed"
                    );
                    break;
                }
            }
            tokio::time::sleep(self.descriptor.subscribe_pace).await;
        }
        tracing::info!(
            exchange = %self.exchange,
            sent,
            active = self.tracker.active_count(),
            "subscriptions sent"
        );
        sent
    }

    /// Tear the connection down and wait for the background units
    pub async fn disconnect(&mut self) {
        self.shared.mark_dead("disconnect requested").await;
        self.reap_tasks().await;
        self.tracker.clear();
        self.shared.set_state(ConnectorState::Disconnected);
    }

    async fn reap_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
    }
}

/// Listen unit: drives the read side until close or error
///
/// Decodes every inbound frame; tickers go to the store and the
/// publisher, protocol replies go straight back out. Only transport
/// errors end the loop.
async fn listen_unit(
    shared: Arc<ConnectorShared>,
    codec: Arc<ExchangeCodec>,
    store: Arc<dyn StateStore>,
    publisher: Arc<dyn Publisher>,
    mut reader: ws::WsReader,
) {
    let exchange = shared.exchange;
    loop {
        if shared.state() == ConnectorState::Dead {
            break;
        }
        let msg = match reader.next().await {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                shared.mark_dead("server closed connection").await;
                break;
            }
            Err(e) => {
                shared.mark_dead(&format!("receive error: {e}")).await;
                break;
            }
        };
        shared.touch_inbound();

        // Standard WS keepalive, common to all protocols
        if let Message::Ping(payload) = msg {
            if let Err(e) = shared.send(Message::Pong(payload)).await {
                tracing::debug!(exchange = %exchange, error = %e, "pong send failed");
            }
            continue;
        }

        match codec.decode(&msg) {
            Ok(DecodedFrame::Ticker(ticker)) => {
                if !ticker.is_plausible() {
                    tracing::debug!(exchange = %exchange, symbol = %ticker.symbol, "implausible ticker dropped");
                    continue;
                }
                shared.metrics.record_message(exchange);
                if let Err(e) = store
                    .save_price(
                        exchange,
                        &ticker.symbol,
                        ticker.bid_price,
                        ticker.ask_price,
                        ticker.bid_qty,
                        ticker.ask_qty,
                    )
                    .await
                {
                    tracing::warn!(exchange = %exchange, symbol = %ticker.symbol, error = %e, "price save failed");
                    continue;
                }
                publisher
                    .publish_price(crate::core::PriceRecord {
                        exchange,
                        symbol: ticker.symbol,
                        bid_price: ticker.bid_price,
                        ask_price: ticker.ask_price,
                        bid_volume: ticker.bid_qty,
                        ask_volume: ticker.ask_qty,
                        observed_at_ms: ticker.timestamp_ms,
                    })
                    .await;
            }
            Ok(DecodedFrame::Reply(reply)) => {
                if let Err(e) = shared.send(reply).await {
                    tracing::debug!(exchange = %exchange, error = %e, "protocol reply send failed");
                }
            }
            Ok(DecodedFrame::Pong) | Ok(DecodedFrame::Control) | Ok(DecodedFrame::Ignore) => {}
            Err(e) => {
                shared.metrics.record_decode_error(exchange);
                tracing::debug!(exchange = %exchange, error = %e, "undecodable frame dropped");
            }
        }
    }
}

/// Keepalive unit for client-initiated ping protocols
///
/// Stops quietly on send failure; the listen unit owns declaring the
/// connection dead.
async fn ping_unit(shared: Arc<ConnectorShared>, codec: Arc<ExchangeCodec>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if shared.state() == ConnectorState::Dead {
            break;
        }
        let Some(ping) = codec.ping_message() else {
            break;
        };
        if let Err(e) = shared.send(ping).await {
            tracing::debug!(exchange = %shared.exchange, error = %e, "ping send failed");
            break;
        }
    }
}

/// Health unit: watches inbound message flow
///
/// A healthy market feed never goes quiet for tens of seconds, so
/// silence past the flow timeout means the transport is gone even if
/// TCP has not noticed yet.
async fn health_unit(shared: Arc<ConnectorShared>, timeout: Duration, check_interval: Duration) {
    let timeout_secs = timeout.as_secs() as i64;
    let mut ticker = tokio::time::interval(check_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let state = shared.state();
        if state == ConnectorState::Dead || state == ConnectorState::Disconnected {
            break;
        }
        if enforce_flow_timeout(&shared, timeout_secs).await {
            break;
        }
    }
}

/// One flow check: a connection quiet past the timeout transitions to
/// `Degraded` and is immediately declared dead. Returns true when it
/// killed the connection.
async fn enforce_flow_timeout(shared: &ConnectorShared, timeout_secs: i64) -> bool {
    let quiet_secs = shared.seconds_since_inbound();
    if quiet_secs <= timeout_secs {
        return false;
    }
    tracing::warn!(exchange = %shared.exchange, quiet_secs, "message flow stopped");
    shared.set_state(ConnectorState::Degraded);
    shared
        .mark_dead(&format!("no inbound frames for {quiet_secs}s"))
        .await;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::ConnectorSettings;
    use crate::infrastructure::NullPublisher;
    use crate::store::{MemoryStore, StorePolicy};

    fn connector(exchange: ExchangeId) -> ExchangeConnector {
        ExchangeConnector::new(
            exchange,
            Arc::new(MemoryStore::new(StorePolicy::default())),
            Arc::new(NullPublisher),
            Arc::new(MetricsCollector::new()),
            &ConnectorSettings::default(),
            None,
        )
    }

    #[tokio::test]
    async fn test_starts_disconnected_and_unhealthy() {
        let conn = connector(ExchangeId::Binance);
        assert_eq!(conn.state(), ConnectorState::Disconnected);
        assert!(!conn.is_healthy());
        assert_eq!(conn.connected_at_ms(), 0);
    }

    #[tokio::test]
    async fn test_endpoint_override_applied() {
        let conn = ExchangeConnector::new(
            ExchangeId::Binance,
            Arc::new(MemoryStore::new(StorePolicy::default())),
            Arc::new(NullPublisher),
            Arc::new(MetricsCollector::new()),
            &ConnectorSettings::default(),
            Some("ws://127.0.0.1:9001/ws"),
        );
        assert_eq!(conn.descriptor.endpoint, "ws://127.0.0.1:9001/ws");
    }

    #[tokio::test]
    async fn test_subscribe_without_transport_fails_symbols() {
        let mut conn = connector(ExchangeId::Bybit);
        let sent = conn
            .subscribe_symbols(&["BTCUSDT".to_string(), "ETHUSDT".to_string()])
            .await;
        assert_eq!(sent, 0);
        assert_eq!(conn.tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_mark_dead_is_idempotent() {
        let conn = connector(ExchangeId::Htx);
        conn.shared.set_state(ConnectorState::Connected);
        conn.shared.mark_dead("first").await;
        assert_eq!(conn.state(), ConnectorState::Dead);
        // second call is a no-op
        conn.shared.mark_dead("second").await;
        assert_eq!(conn.state(), ConnectorState::Dead);
    }

    #[tokio::test]
    async fn test_disconnect_resets_state() {
        let mut conn = connector(ExchangeId::Mexc);
        conn.shared.set_state(ConnectorState::Connected);
        conn.disconnect().await;
        assert_eq!(conn.state(), ConnectorState::Disconnected);
        assert!(!conn.is_healthy());
    }

    #[tokio::test]
    async fn test_health_reflects_inbound_flow() {
        let conn = connector(ExchangeId::Coindcx);
        conn.shared.set_state(ConnectorState::Connected);
        conn.shared.touch_inbound();
        assert!(conn.is_healthy());

        // Backdate the last inbound frame past the flow timeout
        conn.shared.last_inbound_ms.store(
            now_ms() - (conn.message_flow_timeout.as_millis() as i64 + 5_000),
            Ordering::Relaxed,
        );
        assert!(!conn.is_healthy());
    }

    #[tokio::test]
    async fn test_flow_timeout_kills_the_connection() {
        let conn = connector(ExchangeId::Binance);
        conn.shared.set_state(ConnectorState::Connected);
        conn.shared
            .last_inbound_ms
            .store(now_ms() - 60_000, Ordering::Relaxed);

        assert!(enforce_flow_timeout(&conn.shared, 30).await);
        assert_eq!(conn.state(), ConnectorState::Dead);
    }

    #[tokio::test]
    async fn test_flow_within_timeout_left_alone() {
        let conn = connector(ExchangeId::Bybit);
        conn.shared.set_state(ConnectorState::Connected);
        conn.shared.touch_inbound();

        assert!(!enforce_flow_timeout(&conn.shared, 30).await);
        assert_eq!(conn.state(), ConnectorState::Connected);
    }
}
