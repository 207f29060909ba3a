//! HTX (Huobi) codec
//!
//! Every frame arrives as gzip-compressed JSON in a binary WebSocket
//! message, including the in-band `{"ping": ts}` keepalive, which must be
//! answered with `{"pong": ts}` over the same channel. BBO channel:
//! `market.{symbol}.bbo`.

use super::codec::{CodecError, DecodedFrame};
use crate::core::{now_ms, BookTicker};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_tungstenite::tungstenite::protocol::Message;

/// Inflated frames larger than this are dropped as malformed
const MAX_INFLATED_BYTES: u64 = 1024 * 1024;

pub struct HtxCodec {
    request_id: AtomicU64,
}

#[derive(Deserialize)]
struct HtxEnvelope {
    #[serde(default)]
    ping: Option<i64>,
    #[serde(default)]
    subbed: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    ch: Option<String>,
    #[serde(default)]
    ts: Option<i64>,
    #[serde(default)]
    tick: Option<HtxBboTick>,
}

#[derive(Deserialize)]
struct HtxBboTick {
    symbol: String,
    bid: f64,
    #[serde(rename = "bidSize")]
    bid_size: f64,
    ask: f64,
    #[serde(rename = "askSize")]
    ask_size: f64,
}

impl HtxCodec {
    pub fn new() -> Self {
        Self {
            request_id: AtomicU64::new(1),
        }
    }

    /// `{"sub":"market.btcusdt.bbo","id":"sub-1"}`
    pub fn build_subscribe(&self, symbol: &str) -> String {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        serde_json::json!({
            "sub": format!("market.{}.bbo", symbol.to_lowercase()),
            "id": format!("sub-{id}"),
        })
        .to_string()
    }

    pub fn decode(&self, msg: &Message) -> Result<DecodedFrame, CodecError> {
        let compressed = match msg {
            Message::Binary(data) => data.as_ref(),
            // Some gateways send errors as plain text; never market data
            Message::Text(_) => return Ok(DecodedFrame::Ignore),
            _ => return Ok(DecodedFrame::Ignore),
        };

        let mut inflated = String::new();
        GzDecoder::new(compressed)
            .take(MAX_INFLATED_BYTES)
            .read_to_string(&mut inflated)
            .map_err(|e| CodecError::Decompress(e.to_string()))?;

        let mut bytes = inflated.into_bytes();
        let envelope: HtxEnvelope = simd_json::serde::from_slice(&mut bytes)
            .map_err(|e| CodecError::Json(e.to_string()))?;

        if let Some(ts) = envelope.ping {
            let pong = serde_json::json!({ "pong": ts }).to_string();
            return Ok(DecodedFrame::Reply(Message::text(pong)));
        }
        if envelope.subbed.is_some() || envelope.status.is_some() {
            return Ok(DecodedFrame::Control);
        }

        let is_bbo = envelope.ch.as_deref().is_some_and(|ch| ch.ends_with(".bbo"));
        if !is_bbo {
            return Ok(DecodedFrame::Ignore);
        }
        let tick = envelope
            .tick
            .ok_or_else(|| CodecError::Frame("bbo frame without tick".into()))?;

        Ok(DecodedFrame::Ticker(BookTicker {
            symbol: tick.symbol,
            bid_price: tick.bid,
            bid_qty: tick.bid_size,
            ask_price: tick.ask,
            ask_qty: tick.ask_size,
            timestamp_ms: envelope.ts.unwrap_or_else(now_ms),
        }))
    }
}

impl Default for HtxCodec {
    fn default() -> Self {
        Self::new()
    }
}
