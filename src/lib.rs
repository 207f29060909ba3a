//! Cross-exchange arbitrage screener
//!
//! Ingests best bid/ask quotes from multiple exchanges over heterogeneous
//! WebSocket protocols, maintains a connection-health-aware shared price
//! store, and continuously detects cross-exchange arbitrage opportunities.
//!
//! - **core**: domain types (records, pairs, lifecycle states)
//! - **ws**: WebSocket transport and subscription tracking
//! - **exchanges**: protocol descriptors, per-exchange codecs, the connector
//! - **store**: shared state store (memory and redis backends)
//! - **engine**: arbitrage calculator and worker orchestrator
//! - **infrastructure**: config, logging, metrics, publish collaborator

pub mod core;
pub mod engine;
pub mod exchanges;
pub mod infrastructure;
pub mod store;
pub mod ws;

#[cfg(test)]
pub mod test_utils;

pub use infrastructure::config::Settings;
pub use store::{StateStore, StoreError};

use thiserror::Error;

/// Main error type for the screener
#[derive(Error, Debug)]
pub enum ScreenerError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ScreenerError>;
