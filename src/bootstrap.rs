//! Startup helpers shared by the service and arbiter binaries.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    config::{AppConfig, StoreBackend},
    dao::game_store::{GameStore, memory::MemoryGameStore},
    services::words::{Lexicon, LexiconError, WordRules},
};

/// Configure tracing subscribers so logs include spans by default.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Open the configured store, retrying the Redis connection with exponential
/// backoff until it answers.
pub async fn connect_store(config: &AppConfig) -> anyhow::Result<Arc<dyn GameStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            info!("using in-memory store; state is local to this process");
            Ok(Arc::new(MemoryGameStore::new(config.protocol.clone())))
        }
        StoreBackend::Redis => connect_redis(config).await,
    }
}

#[cfg(feature = "redis-store")]
async fn connect_redis(config: &AppConfig) -> anyhow::Result<Arc<dyn GameStore>> {
    use std::time::Duration;

    use tokio::time::sleep;
    use tracing::warn;

    use crate::dao::game_store::redis::{RedisDaoError, RedisGameStore};

    let mut delay = Duration::from_secs(1);
    let max_delay = Duration::from_secs(10);
    loop {
        match RedisGameStore::connect(&config.store.redis_url, config.protocol.clone()).await {
            Ok(store) => {
                info!("connected to Redis");
                return Ok(Arc::new(store));
            }
            Err(err @ RedisDaoError::InvalidUrl { .. }) => return Err(err.into()),
            Err(err) => {
                warn!(error = %err, retry_in = ?delay, "Redis connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(max_delay);
            }
        }
    }
}

#[cfg(not(feature = "redis-store"))]
async fn connect_redis(_config: &AppConfig) -> anyhow::Result<Arc<dyn GameStore>> {
    anyhow::bail!("built without the `redis-store` feature; set STORE_BACKEND=memory")
}

/// Load the configured word map, or the built-in ladder when none is set.
pub fn load_words(config: &AppConfig) -> Result<Arc<dyn WordRules>, LexiconError> {
    let lexicon = match &config.words.word_map_path {
        Some(path) => Lexicon::load(path, config.words.start_words_path.as_deref())?,
        None => {
            let lexicon = Lexicon::builtin()?;
            info!(words = lexicon.len(), "using built-in word ladder");
            lexicon
        }
    };
    Ok(Arc::new(lexicon))
}
