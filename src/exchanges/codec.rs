//! Exchange codec dispatch
//!
//! One codec per exchange, each implementing only decode, ping encoding,
//! and subscribe-message construction. Lifecycle and health logic live in
//! the shared connector; protocol variance stays behind this enum
//! (strategy dispatch, no trait objects in the message path).

use crate::core::{BookTicker, ExchangeId};
use tokio_tungstenite::tungstenite::protocol::Message;

use super::binance::BinanceCodec;
use super::bybit::BybitCodec;
use super::coindcx::CoindcxCodec;
use super::htx::HtxCodec;
use super::mexc::MexcCodec;

/// Outcome of decoding one inbound frame
#[derive(Debug)]
pub enum DecodedFrame {
    /// Best bid/ask market data
    Ticker(BookTicker),
    /// Protocol demands a response (in-band pong, handshake ack)
    Reply(Message),
    /// Server acknowledged one of our pings
    Pong,
    /// Subscription ack or other benign control frame
    Control,
    /// Frame we do not care about
    Ignore,
}

/// Malformed or undecodable frame
///
/// Never fatal: the connector logs and drops these.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("invalid frame: {0}")]
    Frame(String),
    #[error("decompression failed: {0}")]
    Decompress(String),
}

/// Per-exchange codec, dispatched by variant
pub enum ExchangeCodec {
    Binance(BinanceCodec),
    Bybit(BybitCodec),
    Htx(HtxCodec),
    Mexc(MexcCodec),
    Coindcx(CoindcxCodec),
}

impl ExchangeCodec {
    pub fn for_exchange(exchange: ExchangeId) -> Self {
        match exchange {
            ExchangeId::Binance => ExchangeCodec::Binance(BinanceCodec::new()),
            ExchangeId::Bybit => ExchangeCodec::Bybit(BybitCodec::new()),
            ExchangeId::Htx => ExchangeCodec::Htx(HtxCodec::new()),
            ExchangeId::Mexc => ExchangeCodec::Mexc(MexcCodec::new()),
            ExchangeId::Coindcx => ExchangeCodec::Coindcx(CoindcxCodec::new()),
        }
    }

    /// Decode one inbound frame
    pub fn decode(&self, msg: &Message) -> Result<DecodedFrame, CodecError> {
        match self {
            ExchangeCodec::Binance(c) => c.decode(msg),
            ExchangeCodec::Bybit(c) => c.decode(msg),
            ExchangeCodec::Htx(c) => c.decode(msg),
            ExchangeCodec::Mexc(c) => c.decode(msg),
            ExchangeCodec::Coindcx(c) => c.decode(msg),
        }
    }

    /// Subscribe message for one exchange-specific symbol
    pub fn build_subscribe(&self, symbol: &str) -> String {
        match self {
            ExchangeCodec::Binance(c) => c.build_subscribe(symbol),
            ExchangeCodec::Bybit(c) => c.build_subscribe(symbol),
            ExchangeCodec::Htx(c) => c.build_subscribe(symbol),
            ExchangeCodec::Mexc(c) => c.build_subscribe(symbol),
            ExchangeCodec::Coindcx(c) => c.build_subscribe(symbol),
        }
    }

    /// Client-initiated keepalive, when the protocol requires one
    pub fn ping_message(&self) -> Option<Message> {
        match self {
            ExchangeCodec::Binance(_) => None,
            ExchangeCodec::Bybit(c) => Some(c.ping_message()),
            ExchangeCodec::Htx(_) => None,
            ExchangeCodec::Mexc(c) => Some(c.ping_message()),
            ExchangeCodec::Coindcx(c) => Some(c.ping_message()),
        }
    }
}

/// Parse an exchange-quoted decimal string field
#[inline]
pub(crate) fn parse_f64(s: &str) -> Result<f64, CodecError> {
    s.parse::<f64>()
        .map_err(|_| CodecError::Frame(format!("bad numeric field: {s}")))
}
