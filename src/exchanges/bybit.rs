//! Bybit codec (V5 public spot)
//!
//! Plain JSON text frames with an in-band op grammar: client sends
//! `{"op":"ping"}` on an interval, server answers `{"op":"pong"}`.
//! Ticker topic: `tickers.{SYMBOL}`.

use super::codec::{parse_f64, CodecError, DecodedFrame};
use crate::core::{now_ms, BookTicker};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::protocol::Message;

pub struct BybitCodec;

#[derive(Deserialize)]
struct BybitEnvelope {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    ret_msg: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    ts: Option<i64>,
    #[serde(default)]
    data: Option<BybitTickerData>,
}

#[derive(Deserialize)]
struct BybitTickerData {
    symbol: String,
    #[serde(rename = "bid1Price", default)]
    bid_price: Option<String>,
    #[serde(rename = "bid1Size", default)]
    bid_size: Option<String>,
    #[serde(rename = "ask1Price", default)]
    ask_price: Option<String>,
    #[serde(rename = "ask1Size", default)]
    ask_size: Option<String>,
}

impl BybitCodec {
    pub fn new() -> Self {
        Self
    }

    /// `{"op":"subscribe","args":["tickers.BTCUSDT"]}`
    pub fn build_subscribe(&self, symbol: &str) -> String {
        serde_json::json!({
            "op": "subscribe",
            "args": [format!("tickers.{}", symbol.to_uppercase())],
        })
        .to_string()
    }

    pub fn ping_message(&self) -> Message {
        Message::text(r#"{"op":"ping"}"#.to_string())
    }

    pub fn decode(&self, msg: &Message) -> Result<DecodedFrame, CodecError> {
        let text = match msg {
            Message::Text(t) => t.as_str(),
            _ => return Ok(DecodedFrame::Ignore),
        };

        let mut bytes = text.as_bytes().to_vec();
        let envelope: BybitEnvelope = simd_json::serde::from_slice(&mut bytes)
            .map_err(|e| CodecError::Json(e.to_string()))?;

        if envelope.op.as_deref() == Some("pong")
            || envelope.ret_msg.as_deref() == Some("pong")
        {
            return Ok(DecodedFrame::Pong);
        }
        if envelope.success.is_some() {
            return Ok(DecodedFrame::Control);
        }

        let is_ticker = envelope
            .topic
            .as_deref()
            .is_some_and(|t| t.starts_with("tickers."));
        if !is_ticker {
            return Ok(DecodedFrame::Ignore);
        }

        let data = envelope
            .data
            .ok_or_else(|| CodecError::Frame("ticker frame without data".into()))?;

        // Spot ticker deltas may omit one side; only a full quote is usable
        match (data.bid_price, data.bid_size, data.ask_price, data.ask_size) {
            (Some(bp), Some(bq), Some(ap), Some(aq)) => Ok(DecodedFrame::Ticker(BookTicker {
                symbol: data.symbol,
                bid_price: parse_f64(&bp)?,
                bid_qty: parse_f64(&bq)?,
                ask_price: parse_f64(&ap)?,
                ask_qty: parse_f64(&aq)?,
                timestamp_ms: envelope.ts.unwrap_or_else(now_ms),
            })),
            _ => Ok(DecodedFrame::Ignore),
        }
    }
}

impl Default for BybitCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_subscribe_uppercases() {
        let codec = BybitCodec::new();
        let msg = codec.build_subscribe("btcusdt");
        assert!(msg.contains("tickers.BTCUSDT"));
    }

    #[test]
    fn test_decode_ticker() {
        let codec = BybitCodec::new();
        let raw = r#"{"topic":"tickers.BTCUSDT","ts":1700000000123,"type":"snapshot","data":{"symbol":"BTCUSDT","bid1Price":"64999.5","bid1Size":"0.8","ask1Price":"65000.1","ask1Size":"1.2"}}"#;
        match codec.decode(&Message::text(raw)).unwrap() {
            DecodedFrame::Ticker(t) => {
                assert_eq!(t.symbol, "BTCUSDT");
                assert_eq!(t.bid_price, 64999.5);
                assert_eq!(t.ask_qty, 1.2);
                assert_eq!(t.timestamp_ms, 1_700_000_000_123);
            }
            other => panic!("expected ticker, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_pong() {
        let codec = BybitCodec::new();
        let frame = codec
            .decode(&Message::text(r#"{"op":"pong","conn_id":"abc"}"#))
            .unwrap();
        assert!(matches!(frame, DecodedFrame::Pong));
    }

    #[test]
    fn test_decode_subscribe_ack() {
        let codec = BybitCodec::new();
        let frame = codec
            .decode(&Message::text(r#"{"success":true,"op":"subscribe","conn_id":"x"}"#))
            .unwrap();
        assert!(matches!(frame, DecodedFrame::Control));
    }

    #[test]
    fn test_decode_partial_delta_ignored() {
        let codec = BybitCodec::new();
        let raw = r#"{"topic":"tickers.BTCUSDT","ts":1,"type":"delta","data":{"symbol":"BTCUSDT","bid1Price":"64999.5"}}"#;
        assert!(matches!(
            codec.decode(&Message::text(raw)).unwrap(),
            DecodedFrame::Ignore
        ));
    }
}
