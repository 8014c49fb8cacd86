//! Builders to construct the engine from configuration.

pub mod tasker_builder;

pub use tasker_builder::{build_store, build_tasker};
