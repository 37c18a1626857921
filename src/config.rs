//! Application-level configuration: JSON file first, then environment overrides.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    dao::game_store::ProtocolSettings,
    services::{arbiter::ArbiterSettings, hub::HubSettings, websocket_service::ConnectionSettings},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "DELTA_BACK_CONFIG_PATH";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_PORT: u16 = 8080;

/// Which [`GameStore`](crate::dao::game_store::GameStore) implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    /// Single-process only; instances do not share state.
    Memory,
}

impl StoreBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "redis" => Some(Self::Redis),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }

    /// Label used in logs and health responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

/// Shared store connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub redis_url: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            redis_url: DEFAULT_REDIS_URL.into(),
        }
    }
}

/// Word files; the built-in ladder is used when no map is given.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WordSettings {
    pub word_map_path: Option<PathBuf>,
    pub start_words_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub port: u16,
    pub store: StoreSettings,
    pub protocol: ProtocolSettings,
    pub connection: ConnectionSettings,
    pub hub: HubSettings,
    pub arbiter: ArbiterSettings,
    pub words: WordSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            store: StoreSettings::default(),
            protocol: ProtocolSettings::default(),
            connection: ConnectionSettings::default(),
            hub: HubSettings::default(),
            arbiter: ArbiterSettings::default(),
            words: WordSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load the configuration file, fall back to defaults when it is missing or
    /// broken, then apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_file();
        config.apply_env(|key| env::var(key).ok());
        config
    }

    fn load_file() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration file");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Apply `REDIS_URL`, `PORT`, `STORE_BACKEND`, `WORD_MAP_PATH` and
    /// `START_WORDS_PATH` from `lookup`. Unparseable values are logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = lookup("REDIS_URL") {
            self.store.redis_url = url;
        }
        if let Some(raw) = lookup("PORT") {
            match raw.trim().parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!(value = %raw, "ignoring invalid PORT"),
            }
        }
        if let Some(raw) = lookup("STORE_BACKEND") {
            match StoreBackend::parse(&raw) {
                Some(backend) => self.store.backend = backend,
                None => warn!(value = %raw, "ignoring unknown STORE_BACKEND"),
            }
        }
        if let Some(path) = lookup("WORD_MAP_PATH") {
            self.words.word_map_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("START_WORDS_PATH") {
            self.words.start_words_path = Some(PathBuf::from(path));
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
