//! WebSocket transport layer
//!
//! Connection setup with TCP tuning, split reader/writer halves so the
//! listen, ping, and subscribe paths can share one socket, and idempotent
//! subscription tracking.

pub mod connection;
pub mod subscription;

pub use connection::{connect, WsError, WsReader, WsWriter};
pub use subscription::{SubscriptionStatus, SubscriptionTracker};
