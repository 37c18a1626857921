/// Game state storage and the atomic state-transition protocol.
pub mod game_store;
/// Game records and protocol value types.
pub mod models;
/// Storage error types shared by every backend.
pub mod storage;
