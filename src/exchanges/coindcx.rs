//! CoinDCX codec
//!
//! Socket.IO packet-type prefixes over a raw WebSocket: an engine.io
//! digit (0 open, 2 ping, 3 pong, 4 message) optionally followed by a
//! socket.io digit (0 connect, 2 event). Market data arrives as
//! `42["price-change",{...}]` events; subscriptions are `join` events on a
//! per-symbol channel. The engine.io handshake must be acknowledged with
//! `40` before any join is accepted.

use super::codec::{CodecError, DecodedFrame};
use crate::core::{now_ms, BookTicker};
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::protocol::Message;

pub struct CoindcxCodec;

#[derive(Deserialize)]
struct CoindcxPriceChange {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b")]
    bid: f64,
    #[serde(rename = "bq")]
    bid_qty: f64,
    #[serde(rename = "a")]
    ask: f64,
    #[serde(rename = "aq")]
    ask_qty: f64,
    #[serde(rename = "T", default)]
    timestamp_ms: Option<i64>,
}

impl CoindcxCodec {
    pub fn new() -> Self {
        Self
    }

    /// `42["join",{"channelName":"BTCUSDT"}]`
    pub fn build_subscribe(&self, symbol: &str) -> String {
        format!(
            r#"42["join",{}]"#,
            serde_json::json!({ "channelName": symbol })
        )
    }

    /// engine.io client ping
    pub fn ping_message(&self) -> Message {
        Message::text("2".to_string())
    }

    pub fn decode(&self, msg: &Message) -> Result<DecodedFrame, CodecError> {
        let text = match msg {
            Message::Text(t) => t.as_str(),
            _ => return Ok(DecodedFrame::Ignore),
        };

        // engine.io packet type is the first byte
        match text.as_bytes().first() {
            // open: acknowledge the socket.io namespace
            Some(b'0') => Ok(DecodedFrame::Reply(Message::text("40".to_string()))),
            // server ping
            Some(b'2') => Ok(DecodedFrame::Reply(Message::text("3".to_string()))),
            // pong for our client ping
            Some(b'3') => Ok(DecodedFrame::Pong),
            Some(b'4') => self.decode_socketio(text),
            _ => Ok(DecodedFrame::Ignore),
        }
    }

    fn decode_socketio(&self, text: &str) -> Result<DecodedFrame, CodecError> {
        // "40..." connect ack, "42[...]" event
        if text.starts_with("40") {
            return Ok(DecodedFrame::Control);
        }
        let Some(payload) = text.strip_prefix("42") else {
            return Ok(DecodedFrame::Ignore);
        };

        let mut bytes = payload.as_bytes().to_vec();
        let event: Vec<Value> = simd_json::serde::from_slice(&mut bytes)
            .map_err(|e| CodecError::Json(e.to_string()))?;

        let name = event
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::Frame("event without name".into()))?;
        if name != "price-change" {
            return Ok(DecodedFrame::Ignore);
        }

        let data = event
            .get(1)
            .cloned()
            .ok_or_else(|| CodecError::Frame("price-change without payload".into()))?;
        let change: CoindcxPriceChange =
            serde_json::from_value(data).map_err(|e| CodecError::Json(e.to_string()))?;

        Ok(DecodedFrame::Ticker(BookTicker {
            symbol: change.symbol,
            bid_price: change.bid,
            bid_qty: change.bid_qty,
            ask_price: change.ask,
            ask_qty: change.ask_qty,
            timestamp_ms: change.timestamp_ms.unwrap_or_else(now_ms),
        }))
    }
}

impl Default for CoindcxCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_packet_acknowledged() {
        let codec = CoindcxCodec::new();
        let open = r#"0{"sid":"abc","pingInterval":25000,"pingTimeout":5000}"#;
        match codec.decode(&Message::text(open)).unwrap() {
            DecodedFrame::Reply(Message::Text(t)) => assert_eq!(t.as_str(), "40"),
            other => panic!("expected 40 reply, got {other:?}"),
        }
    }

    #[test]
    fn test_server_ping_answered_with_pong() {
        let codec = CoindcxCodec::new();
        match codec.decode(&Message::text("2")).unwrap() {
            DecodedFrame::Reply(Message::Text(t)) => assert_eq!(t.as_str(), "3"),
            other => panic!("expected 3 reply, got {other:?}"),
        }
    }

    #[test]
    fn test_pong_packet() {
        let codec = CoindcxCodec::new();
        assert!(matches!(
            codec.decode(&Message::text("3")).unwrap(),
            DecodedFrame::Pong
        ));
    }

    #[test]
    fn test_price_change_event() {
        let codec = CoindcxCodec::new();
        let raw = r#"42["price-change",{"s":"BTCUSDT","b":64999.5,"bq":0.7,"a":65000.2,"aq":1.1,"T":1700000000999}]"#;
        match codec.decode(&Message::text(raw)).unwrap() {
            DecodedFrame::Ticker(t) => {
                assert_eq!(t.symbol, "BTCUSDT");
                assert_eq!(t.bid_price, 64999.5);
                assert_eq!(t.ask_price, 65000.2);
                assert_eq!(t.timestamp_ms, 1_700_000_000_999);
            }
            other => panic!("expected ticker, got {other:?}"),
        }
    }

    #[test]
    fn test_other_events_ignored() {
        let codec = CoindcxCodec::new();
        let raw = r#"42["new-trade",{"s":"BTCUSDT","p":65000.0}]"#;
        assert!(matches!(
            codec.decode(&Message::text(raw)).unwrap(),
            DecodedFrame::Ignore
        ));
    }

    #[test]
    fn test_connect_ack_is_control() {
        let codec = CoindcxCodec::new();
        assert!(matches!(
            codec.decode(&Message::text(r#"40{"sid":"xyz"}"#)).unwrap(),
            DecodedFrame::Control
        ));
    }

    #[test]
    fn test_malformed_event_is_error() {
        let codec = CoindcxCodec::new();
        assert!(codec.decode(&Message::text(r#"42["price-change""#)).is_err());
    }

    #[test]
    fn test_build_subscribe() {
        let codec = CoindcxCodec::new();
        let msg = codec.build_subscribe("BTCUSDT");
        assert!(msg.starts_with("42[\"join\""));
        assert!(msg.contains("channelName"));
    }
}
