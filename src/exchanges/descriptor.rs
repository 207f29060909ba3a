//! Protocol descriptors
//!
//! Per-exchange wire constants: endpoint, framing mode, ping policy, and
//! subscribe pacing. Descriptors are data only; behavior lives in the
//! per-exchange codecs.

use crate::core::ExchangeId;
use std::time::Duration;

/// How an exchange frames its market-data stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Plain JSON text frames
    Text,
    /// Gzip-compressed JSON in binary frames
    Gzip,
    /// Binary protobuf data frames, JSON text control frames
    Binary,
    /// Socket.IO packet-type prefixes over raw WebSocket
    SocketIo,
}

/// Who initiates application-level keepalive pings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingPolicy {
    /// Server pings (WS frames or in-band); the connector only replies
    ServerInitiated,
    /// Client must send a protocol-specific ping at this interval
    ClientInitiated { interval: Duration },
}

/// Per-exchange wire protocol constants
#[derive(Debug, Clone)]
pub struct ProtocolDescriptor {
    pub exchange: ExchangeId,
    pub endpoint: String,
    pub framing: Framing,
    pub ping: PingPolicy,
    /// Delay between consecutive subscribe sends (exchange rate limits)
    pub subscribe_pace: Duration,
}

impl ProtocolDescriptor {
    /// Descriptor for one exchange
    pub fn for_exchange(exchange: ExchangeId) -> Self {
        match exchange {
            ExchangeId::Binance => Self {
                exchange,
                endpoint: "wss://stream.binance.com:9443/ws".to_string(),
                framing: Framing::Text,
                ping: PingPolicy::ServerInitiated,
                subscribe_pace: Duration::from_millis(250),
            },
            ExchangeId::Bybit => Self {
                exchange,
                endpoint: "wss://stream.bybit.com/v5/public/spot".to_string(),
                framing: Framing::Text,
                ping: PingPolicy::ClientInitiated {
                    interval: Duration::from_secs(20),
                },
                subscribe_pace: Duration::from_millis(100),
            },
            ExchangeId::Htx => Self {
                exchange,
                endpoint: "wss://api.huobi.pro/ws".to_string(),
                framing: Framing::Gzip,
                ping: PingPolicy::ServerInitiated,
                subscribe_pace: Duration::from_millis(100),
            },
            ExchangeId::Mexc => Self {
                exchange,
                endpoint: "wss://wbs-api.mexc.com/ws".to_string(),
                framing: Framing::Binary,
                ping: PingPolicy::ClientInitiated {
                    interval: Duration::from_secs(15),
                },
                subscribe_pace: Duration::from_millis(100),
            },
            ExchangeId::Coindcx => Self {
                exchange,
                endpoint: "wss://stream.coindcx.com/socket.io/?EIO=3&transport=websocket".to_string(),
                framing: Framing::SocketIo,
                ping: PingPolicy::ClientInitiated {
                    interval: Duration::from_secs(25),
                },
                subscribe_pace: Duration::from_millis(100),
            },
        }
    }

    /// Replace the endpoint, for configuration overrides
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Validate the endpoint (catches overrides with bad schemes)
    pub fn validate_endpoint(url: &str) -> Result<(), String> {
        let parsed = url::Url::parse(url).map_err(|e| e.to_string())?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(format!("unsupported scheme: {other}")),
        }
    }
}
