//! Exchange integrations
//!
//! One codec per exchange plus a shared connector. Adding an exchange
//! means writing a codec and a protocol descriptor; the connector,
//! store, and engine are untouched.

pub mod binance;
pub mod bybit;
pub mod codec;
pub mod coindcx;
pub mod connector;
pub mod descriptor;
pub mod htx;
pub mod mexc;

pub use codec::{CodecError, DecodedFrame, ExchangeCodec};
pub use connector::ExchangeConnector;
pub use descriptor::{Framing, PingPolicy, ProtocolDescriptor};
