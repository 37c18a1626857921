//! Timeout arbiter process: settles games whose turn timer lapsed.

use anyhow::Context;
use tracing::info;

use delta_back::{
    bootstrap::{connect_store, init_tracing, shutdown_signal},
    config::AppConfig,
    services::arbiter::TimeoutArbiter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = connect_store(&config).await.context("connecting store")?;

    let arbiter = TimeoutArbiter::new(store, config.arbiter.clone()).spawn();
    shutdown_signal().await;

    info!("shutdown requested; waiting for the current round");
    arbiter.shutdown().await;
    Ok(())
}
