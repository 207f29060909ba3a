//! Cross-exchange arbitrage screener
//!
//! Wires the pieces together: config, logging, the chosen store backend,
//! the broadcast publisher, and the orchestrator. Runs until Ctrl-C.

use anyhow::Context;
use arb_screener::engine::Orchestrator;
use arb_screener::infrastructure::{init_logging, BroadcastPublisher, MetricsCollector, Settings};
use arb_screener::store::{MemoryStore, RedisStore, StateStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guards = init_logging();

    let settings = Settings::load().context("failed to load configuration")?;
    tracing::info!(
        exchanges = ?settings.exchanges.enabled,
        pairs = settings.pairs.len(),
        backend = %settings.store.backend,
        "starting arbitrage screener"
    );

    let policy = settings.store.to_policy();
    let store: Arc<dyn StateStore> = match settings.store.backend.as_str() {
        "redis" => Arc::new(
            RedisStore::connect(&settings.store.redis_url, policy)
                .await
                .context("failed to connect to redis")?,
        ),
        _ => Arc::new(MemoryStore::new(policy)),
    };

    let publisher = Arc::new(BroadcastPublisher::new(
        settings.publish.channel_capacity,
        settings.publish.price_throttle_ms,
    ));
    let metrics = Arc::new(MetricsCollector::new());

    let mut orchestrator = Orchestrator::new(settings, store, publisher, metrics);
    orchestrator.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    orchestrator.shutdown().await;
    Ok(())
}
