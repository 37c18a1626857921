//! Error types of the Redis storage implementation.

use redis::RedisError;
use thiserror::Error;

use crate::dao::{models::ModelError, storage::StorageError};

/// Convenient result alias returning [`RedisDaoError`] failures.
pub type RedisDaoResult<T> = Result<T, RedisDaoError>;

/// Failures that can occur while talking to Redis.
#[derive(Debug, Error)]
pub enum RedisDaoError {
    /// The connection URL could not be parsed.
    #[error("invalid Redis URL")]
    InvalidUrl {
        #[source]
        source: RedisError,
    },
    /// The initial connection could not be established.
    #[error("failed to connect to Redis")]
    Connect {
        #[source]
        source: RedisError,
    },
    #[error("Redis ping health check failed")]
    HealthPing {
        #[source]
        source: RedisError,
    },
    /// A protocol script failed to run (not a rule rejection).
    #[error("Redis script `{script}` failed")]
    Script {
        script: &'static str,
        #[source]
        source: RedisError,
    },
    #[error("Redis command `{command}` failed")]
    Command {
        command: &'static str,
        #[source]
        source: RedisError,
    },
    /// Opening the pub/sub connection or subscribing failed.
    #[error("failed to subscribe to `{pattern}`")]
    Subscribe {
        pattern: &'static str,
        #[source]
        source: RedisError,
    },
    /// A stored game hash could not be decoded.
    #[error("failed to decode game `{game_id}`")]
    DecodeGame {
        game_id: String,
        #[source]
        source: ModelError,
    },
}

impl From<RedisDaoError> for StorageError {
    fn from(err: RedisDaoError) -> Self {
        match err {
            RedisDaoError::DecodeGame { game_id, source } => {
                StorageError::malformed("find_game", format!("game `{game_id}`: {source}"))
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
