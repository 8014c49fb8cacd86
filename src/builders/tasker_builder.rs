//! Builders to construct the task store and engine from configuration.

use std::sync::Arc;

use crate::config::{StoreBackendConfig, TaskerConfig};
use crate::core::{CallableRegistry, ContextSource, TaskStore, Tasker, TaskerError};
use crate::infra::{InMemoryTaskStore, JsonFileTaskStore};

/// Open the store backend named by the configuration.
pub fn build_store(cfg: &TaskerConfig) -> Result<Arc<dyn TaskStore>, TaskerError> {
    match &cfg.store {
        StoreBackendConfig::InMemory => Ok(Arc::new(InMemoryTaskStore::new())),
        StoreBackendConfig::File { path } => {
            tracing::info!("opening task store at {}", path.display());
            Ok(Arc::new(JsonFileTaskStore::open(path)?))
        }
    }
}

/// Validate the configuration, open its store, and build the engine.
pub fn build_tasker(
    cfg: TaskerConfig,
    registry: Arc<CallableRegistry>,
    contexts: Arc<dyn ContextSource>,
) -> Result<Tasker, TaskerError> {
    cfg.validate().map_err(TaskerError::Config)?;
    let store = build_store(&cfg)?;
    Ok(Tasker::new(cfg, store, registry, contexts))
}
