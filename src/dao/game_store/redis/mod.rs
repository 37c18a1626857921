//! Production backend: every transition is a Lua script executed atomically by Redis.

mod error;
mod scripts;
mod store;

pub use error::{RedisDaoError, RedisDaoResult};
pub use store::RedisGameStore;
