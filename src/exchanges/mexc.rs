//! MEXC codec
//!
//! Market data arrives as binary protobuf frames; control traffic
//! (subscription acks, PONG) is plain JSON text, so frame type alone
//! separates the two. The protobuf wrapper is decoded with a minimal wire
//! walk (varint / length-delimited traversal) instead of generated code:
//! only the channel, symbol, send-time, and book-ticker body are needed.
//!
//! Wrapper fields: 1 = channel (string), 3 = symbol (string),
//! 6 = send time (varint millis), 3xx = push body (message). Book-ticker
//! body fields: 1 = bid price, 2 = bid quantity, 3 = ask price,
//! 4 = ask quantity, all decimal strings.

use super::codec::{parse_f64, CodecError, DecodedFrame};
use crate::core::{now_ms, BookTicker};
use tokio_tungstenite::tungstenite::protocol::Message;

pub struct MexcCodec;

impl MexcCodec {
    pub fn new() -> Self {
        Self
    }

    /// `{"method":"SUBSCRIPTION","params":["spot@public.bookTicker.v3.api.pb@BTCUSDT"]}`
    pub fn build_subscribe(&self, symbol: &str) -> String {
        serde_json::json!({
            "method": "SUBSCRIPTION",
            "params": [format!("spot@public.bookTicker.v3.api.pb@{}", symbol.to_uppercase())],
        })
        .to_string()
    }

    pub fn ping_message(&self) -> Message {
        Message::text(r#"{"method":"PING"}"#.to_string())
    }

    pub fn decode(&self, msg: &Message) -> Result<DecodedFrame, CodecError> {
        match msg {
            Message::Text(t) => {
                let text = t.as_str();
                if text.contains("PONG") {
                    Ok(DecodedFrame::Pong)
                } else if text.contains("\"code\"") || text.contains("\"id\"") {
                    Ok(DecodedFrame::Control)
                } else {
                    Ok(DecodedFrame::Ignore)
                }
            }
            Message::Binary(data) => decode_push_frame(data.as_ref()),
            _ => Ok(DecodedFrame::Ignore),
        }
    }
}

impl Default for MexcCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode one binary push frame into a ticker
fn decode_push_frame(data: &[u8]) -> Result<DecodedFrame, CodecError> {
    let mut channel: Option<&str> = None;
    let mut symbol: Option<&str> = None;
    let mut send_time: Option<i64> = None;
    let mut body: Option<&[u8]> = None;

    let mut pos = 0;
    while pos < data.len() {
        let (field, wire) = read_tag(data, &mut pos)?;
        match (field, wire) {
            (1, WIRE_LEN) => channel = Some(read_str(data, &mut pos)?),
            (3, WIRE_LEN) => symbol = Some(read_str(data, &mut pos)?),
            (6, WIRE_VARINT) => send_time = Some(read_varint(data, &mut pos)? as i64),
            // Push bodies use high field numbers, one per channel family
            (300..=399, WIRE_LEN) => body = Some(read_bytes(data, &mut pos)?),
            _ => skip_field(data, &mut pos, wire)?,
        }
    }

    if !channel.unwrap_or_default().contains("bookTicker") {
        return Ok(DecodedFrame::Ignore);
    }
    let body = body.ok_or_else(|| CodecError::Frame("push frame without body".into()))?;
    let symbol = symbol
        .ok_or_else(|| CodecError::Frame("push frame without symbol".into()))?;

    // Body: four decimal strings, fields 1..=4
    let mut sides = [None::<&str>; 4];
    let mut pos = 0;
    while pos < body.len() {
        let (field, wire) = read_tag(body, &mut pos)?;
        match (field, wire) {
            (1..=4, WIRE_LEN) => sides[(field - 1) as usize] = Some(read_str(body, &mut pos)?),
            _ => skip_field(body, &mut pos, wire)?,
        }
    }
    let (bid, bid_qty, ask, ask_qty) = match sides {
        [Some(b), Some(bq), Some(a), Some(aq)] => (b, bq, a, aq),
        _ => return Err(CodecError::Frame("book ticker body missing sides".into())),
    };

    Ok(DecodedFrame::Ticker(BookTicker {
        symbol: symbol.to_string(),
        bid_price: parse_f64(bid)?,
        bid_qty: parse_f64(bid_qty)?,
        ask_price: parse_f64(ask)?,
        ask_qty: parse_f64(ask_qty)?,
        timestamp_ms: send_time.unwrap_or_else(now_ms),
    }))
}

const WIRE_VARINT: u8 = 0;
const WIRE_I64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_I32: u8 = 5;

fn read_tag(data: &[u8], pos: &mut usize) -> Result<(u64, u8), CodecError> {
    let tag = read_varint(data, pos)?;
    Ok((tag >> 3, (tag & 0x7) as u8))
}

fn read_varint(data: &[u8], pos: &mut usize) -> Result<u64, CodecError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| CodecError::Frame("truncated varint".into()))?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(CodecError::Frame("varint overflow".into()));
        }
    }
}

fn read_bytes<'a>(data: &'a [u8], pos: &mut usize) -> Result<&'a [u8], CodecError> {
    let len = read_varint(data, pos)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| CodecError::Frame("truncated length-delimited field".into()))?;
    let slice = &data[*pos..end];
    *pos = end;
    Ok(slice)
}

fn read_str<'a>(data: &'a [u8], pos: &mut usize) -> Result<&'a str, CodecError> {
    std::str::from_utf8(read_bytes(data, pos)?)
        .map_err(|e| CodecError::Frame(format!("invalid utf8 string field: {e}")))
}

fn skip_field(data: &[u8], pos: &mut usize, wire: u8) -> Result<(), CodecError> {
    match wire {
        WIRE_VARINT => {
            read_varint(data, pos)?;
        }
        WIRE_I64 => {
            *pos = pos
                .checked_add(8)
                .filter(|end| *end <= data.len())
                .ok_or_else(|| CodecError::Frame("truncated fixed64".into()))?;
        }
        WIRE_LEN => {
            read_bytes(data, pos)?;
        }
        WIRE_I32 => {
            *pos = pos
                .checked_add(4)
                .filter(|end| *end <= data.len())
                .ok_or_else(|| CodecError::Frame("truncated fixed32".into()))?;
        }
        other => return Err(CodecError::Frame(format!("unsupported wire type {other}"))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_varint(buf: &mut Vec<u8>, mut v: u64) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                buf.push(byte);
                break;
            }
            buf.push(byte | 0x80);
        }
    }

    fn put_str(buf: &mut Vec<u8>, field: u64, s: &str) {
        put_varint(buf, (field << 3) | u64::from(WIRE_LEN));
        put_varint(buf, s.len() as u64);
        buf.extend_from_slice(s.as_bytes());
    }

    fn sample_frame() -> Vec<u8> {
        let mut body = Vec::new();
        put_str(&mut body, 1, "65000.1");
        put_str(&mut body, 2, "1.2");
        put_str(&mut body, 3, "65000.5");
        put_str(&mut body, 4, "0.8");

        let mut frame = Vec::new();
        put_str(&mut frame, 1, "spot@public.bookTicker.v3.api.pb@BTCUSDT");
        put_str(&mut frame, 3, "BTCUSDT");
        put_varint(&mut frame, (6 << 3) | u64::from(WIRE_VARINT));
        put_varint(&mut frame, 1_700_000_000_777);
        put_varint(&mut frame, (310 << 3) | u64::from(WIRE_LEN));
        put_varint(&mut frame, body.len() as u64);
        frame.extend_from_slice(&body);
        frame
    }

    #[test]
    fn test_decode_binary_book_ticker() {
        let codec = MexcCodec::new();
        match codec
            .decode(&Message::Binary(sample_frame().into()))
            .unwrap()
        {
            DecodedFrame::Ticker(t) => {
                assert_eq!(t.symbol, "BTCUSDT");
                assert_eq!(t.bid_price, 65000.1);
                assert_eq!(t.bid_qty, 1.2);
                assert_eq!(t.ask_price, 65000.5);
                assert_eq!(t.ask_qty, 0.8);
                assert_eq!(t.timestamp_ms, 1_700_000_000_777);
            }
            other => panic!("expected ticker, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_skips_unknown_fields() {
        let mut frame = sample_frame();
        // Append an unknown varint field (field 9)
        put_varint(&mut frame, (9 << 3) | u64::from(WIRE_VARINT));
        put_varint(&mut frame, 42);

        let codec = MexcCodec::new();
        assert!(matches!(
            codec.decode(&Message::Binary(frame.into())).unwrap(),
            DecodedFrame::Ticker(_)
        ));
    }

    #[test]
    fn test_decode_truncated_frame_is_error() {
        let mut frame = sample_frame();
        frame.truncate(frame.len() - 3);
        let codec = MexcCodec::new();
        assert!(codec.decode(&Message::Binary(frame.into())).is_err());
    }

    #[test]
    fn test_decode_other_channel_ignored() {
        let mut frame = Vec::new();
        put_str(&mut frame, 1, "spot@public.deals.v3.api.pb@BTCUSDT");
        put_str(&mut frame, 3, "BTCUSDT");
        let codec = MexcCodec::new();
        assert!(matches!(
            codec.decode(&Message::Binary(frame.into())).unwrap(),
            DecodedFrame::Ignore
        ));
    }

    #[test]
    fn test_decode_json_control_frames() {
        let codec = MexcCodec::new();
        assert!(matches!(
            codec.decode(&Message::text(r#"{"msg":"PONG"}"#)).unwrap(),
            DecodedFrame::Pong
        ));
        assert!(matches!(
            codec
                .decode(&Message::text(r#"{"id":0,"code":0,"msg":"spot@..."}"#))
                .unwrap(),
            DecodedFrame::Control
        ));
    }

    #[test]
    fn test_build_subscribe() {
        let codec = MexcCodec::new();
        let msg = codec.build_subscribe("btcusdt");
        assert!(msg.contains("SUBSCRIPTION"));
        assert!(msg.contains("@BTCUSDT"));
    }
}
