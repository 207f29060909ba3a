//! Cold path infrastructure
//!
//! Config, logging, metrics, and the downstream publishing seam. Nothing
//! here sits on the message path except atomic metric increments.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod publish;

pub use config::{ConfigError, Settings};
pub use logging::init_logging;
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use publish::{BroadcastPublisher, NullPublisher, Publisher, ScreenerEvent};
