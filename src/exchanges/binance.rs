//! Binance codec
//!
//! Plain JSON text frames. Keepalive is server-initiated WebSocket ping
//! frames, which the connector answers at the transport level; no in-band
//! ping exists, so `ping_message` is not implemented here.
//!
//! bookTicker format:
//! `{"u":400900217,"s":"BTCUSDT","b":"25000.50","B":"1.5","a":"25001.00","A":"2.0"}`

use super::codec::{parse_f64, CodecError, DecodedFrame};
use crate::core::{now_ms, BookTicker};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_tungstenite::tungstenite::protocol::Message;

pub struct BinanceCodec {
    request_id: AtomicU64,
}

#[derive(Deserialize)]
struct BinanceBookTicker {
    s: String,
    b: String,
    #[serde(rename = "B")]
    bid_qty: String,
    a: String,
    #[serde(rename = "A")]
    ask_qty: String,
    #[serde(rename = "E", default)]
    event_time: Option<i64>,
}

impl BinanceCodec {
    pub fn new() -> Self {
        Self {
            request_id: AtomicU64::new(1),
        }
    }

    /// `{"method":"SUBSCRIBE","params":["btcusdt@bookTicker"],"id":n}`
    pub fn build_subscribe(&self, symbol: &str) -> String {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        serde_json::json!({
            "method": "SUBSCRIBE",
            "params": [format!("{}@bookTicker", symbol.to_lowercase())],
            "id": id,
        })
        .to_string()
    }

    pub fn decode(&self, msg: &Message) -> Result<DecodedFrame, CodecError> {
        let text = match msg {
            Message::Text(t) => t.as_str(),
            _ => return Ok(DecodedFrame::Ignore),
        };

        // Subscription acks look like {"result":null,"id":1}
        if text.contains("\"result\"") {
            return Ok(DecodedFrame::Control);
        }
        if !text.contains("\"s\"") || !text.contains("\"b\"") {
            return Ok(DecodedFrame::Ignore);
        }

        let mut bytes = text.as_bytes().to_vec();
        let frame: BinanceBookTicker = simd_json::serde::from_slice(&mut bytes)
            .map_err(|e| CodecError::Json(e.to_string()))?;

        Ok(DecodedFrame::Ticker(BookTicker {
            symbol: frame.s,
            bid_price: parse_f64(&frame.b)?,
            bid_qty: parse_f64(&frame.bid_qty)?,
            ask_price: parse_f64(&frame.a)?,
            ask_qty: parse_f64(&frame.ask_qty)?,
            timestamp_ms: frame.event_time.unwrap_or_else(now_ms),
        }))
    }
}

impl Default for BinanceCodec {
    fn default() -> Self {
        Self::new()
    }
}
