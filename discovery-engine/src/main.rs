use std::sync::Arc;

use anyhow::Result;
use discovery_engine::provider_stub::UnconfiguredProvider;
use discovery_engine::{Config, Engine};
use discovery_store::PostgresStore;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "discovery_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting discovery engine");

    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    let pool = discovery_store::establish_pool(&config.database_url)?;
    tracing::info!("database connection pool initialized");
    let store: Arc<dyn discovery_types::Store> = Arc::new(PostgresStore::new(pool));
    let provider: Arc<dyn discovery_types::Provider> = Arc::new(UnconfiguredProvider);

    let shutdown_timeout = config.shutdown_timeout;
    let engine = Engine::spawn(&config, provider, store);

    tracing::info!("discovery engine running, press Ctrl+C to stop");
    signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining outstanding storage workers");

    let drained = engine.shutdown(shutdown_timeout).await;
    if drained {
        tracing::info!("discovery engine stopped cleanly");
    } else {
        tracing::error!(
            timeout_secs = shutdown_timeout.as_secs(),
            "shutdown timeout elapsed with storage workers still in flight"
        );
    }

    Ok(())
}
