//! Infrastructure adapters for task record storage.

pub mod store;
pub use store::InMemoryTaskStore;
pub use store::JsonFileTaskStore;
