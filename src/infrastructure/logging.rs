//! Centralized file-based logging
//!
//! Writes logs to files in logs/ directory, separated by concern:
//! - logs/main.log - General application logs
//! - logs/error.log - Error and warning logs only
//! - logs/ws.log - WebSocket and connector logs
//! - logs/engine.log - Calculator and orchestrator logs

use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize centralized file logging
///
/// Creates logs/ directory and sets up file appenders per concern.
/// Returns WorkerGuards which must be kept alive for the duration of
/// the program.
pub fn init_logging() -> Vec<WorkerGuard> {
    let logs_dir = Path::new("logs");
    if !logs_dir.exists() {
        fs::create_dir_all(logs_dir).expect("Failed to create logs directory");
    }

    let mut guards = Vec::new();

    let (main_appender, main_guard) = create_appender("logs", "main");
    guards.push(main_guard);

    let (error_appender, error_guard) = create_appender("logs", "error");
    guards.push(error_guard);

    let (ws_appender, ws_guard) = create_appender("logs", "ws");
    guards.push(ws_guard);

    let (engine_appender, engine_guard) = create_appender("logs", "engine");
    guards.push(engine_guard);

    let main_layer = tracing_subscriber::fmt::layer()
        .with_writer(main_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

    let ws_layer = tracing_subscriber::fmt::layer()
        .with_writer(ws_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target().contains("ws")
                || metadata.target().contains("exchanges")
                || metadata.target().contains("connector")
        }));

    let engine_layer = tracing_subscriber::fmt::layer()
        .with_writer(engine_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target().contains("engine")
                || metadata.target().contains("calculator")
                || metadata.target().contains("orchestrator")
        }));

    // Console layer for development
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(main_layer)
        .with(error_layer)
        .with(ws_layer)
        .with(engine_layer)
        .with(console_layer)
        .init();

    tracing::info!("Logging system initialized. Log files in logs/ directory");

    guards
}

/// Create a rolling file appender
fn create_appender(dir: &str, name: &str) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    (non_blocking, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_creation() {
        let test_dir = Path::new("logs_test");
        if test_dir.exists() {
            fs::remove_dir_all(test_dir).ok();
        }

        fs::create_dir_all(test_dir).unwrap();
        assert!(test_dir.exists());

        fs::remove_dir_all(test_dir).ok();
    }
}
