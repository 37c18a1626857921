//! In-process backend used for tests and single-instance development.

mod store;

pub use store::MemoryGameStore;
