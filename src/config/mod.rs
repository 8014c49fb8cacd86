//! Configuration models for the engine, its store, and its triggers.

pub mod tasker;

pub use tasker::{StoreBackendConfig, TaskerConfig};
