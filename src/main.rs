//! Delta Back binary entrypoint wiring REST, WebSocket, the connection hub and the broadcast relay.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use delta_back::{
    bootstrap::{connect_store, init_tracing, load_words, shutdown_signal},
    config::AppConfig,
    routes,
    services::{auth::HeaderAuthenticator, hub::Hub, relay},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let words = load_words(&config).context("loading word list")?;
    let store = connect_store(&config).await.context("connecting store")?;

    let (hub, hub_task) = Hub::spawn(store.clone(), words.clone(), &config.hub);
    let relay_task = relay::start(store.clone(), hub.clone())
        .await
        .context("subscribing to game channels")?;

    let port = config.port;
    let app_state = AppState::new(config, store, words, Arc::new(HeaderAuthenticator), hub);
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    relay_task.abort();
    hub_task.abort();
    info!("server stopped");
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
