//! Tests for builder modules

use std::sync::Arc;

use prometheus_tasker::builders::{build_store, build_tasker};
use prometheus_tasker::config::{StoreBackendConfig, TaskerConfig};
use prometheus_tasker::core::{CallableRegistry, InMemoryContextSource, TaskSelector, TaskerError};

#[test]
fn test_build_in_memory_store() {
    let store = build_store(&TaskerConfig::default()).unwrap();
    assert!(store.find(&TaskSelector::all()).unwrap().is_empty());
}

#[test]
fn test_build_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = TaskerConfig {
        store: StoreBackendConfig::File {
            path: dir.path().join("tasks.jsonl"),
        },
        ..TaskerConfig::default()
    };
    let store = build_store(&config).unwrap();
    assert!(store.get(1).unwrap().is_none());
}

#[test]
fn test_build_tasker_validates_config() {
    let config = TaskerConfig {
        max_notices: 0,
        ..TaskerConfig::default()
    };
    let result = build_tasker(
        config,
        Arc::new(CallableRegistry::new()),
        Arc::new(InMemoryContextSource::new()),
    );
    assert!(matches!(result, Err(TaskerError::Config(_))));
}

#[test]
fn test_build_tasker_keeps_config() {
    let config = TaskerConfig {
        debug: true,
        ..TaskerConfig::default()
    };
    let tasker = build_tasker(
        config,
        Arc::new(CallableRegistry::new()),
        Arc::new(InMemoryContextSource::new()),
    )
    .unwrap();
    assert!(tasker.config().debug);
    assert!(tasker.notices().debug_enabled());
}
