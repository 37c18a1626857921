use std::sync::Arc;

use crate::{
    config::{AppConfig, StoreBackend},
    dao::game_store::GameStore,
    services::{auth::Authenticator, hub::HubHandle, words::WordRules},
};

pub type SharedState = Arc<AppState>;

/// Central application state shared by every route and socket.
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn GameStore>,
    words: Arc<dyn WordRules>,
    auth: Arc<dyn Authenticator>,
    hub: HubHandle,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn GameStore>,
        words: Arc<dyn WordRules>,
        auth: Arc<dyn Authenticator>,
        hub: HubHandle,
    ) -> SharedState {
        Arc::new(Self {
            config,
            store,
            words,
            auth,
            hub,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Shared store backing the game protocol.
    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    pub fn backend(&self) -> StoreBackend {
        self.config.store.backend
    }

    pub fn words(&self) -> &dyn WordRules {
        self.words.as_ref()
    }

    pub fn auth(&self) -> &dyn Authenticator {
        self.auth.as_ref()
    }

    /// Local connection hub of this instance.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }
}
