//! Tests for configuration validation

use std::path::PathBuf;
use std::time::Duration;

use prometheus_tasker::config::{StoreBackendConfig, TaskerConfig};

fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn test_defaults_are_valid() {
    let cfg = TaskerConfig::default();
    assert!(cfg.validate().is_ok());
    assert!(cfg.enable_periodic);
    assert!(!cfg.enable_cron);
    assert_eq!(cfg.periodic_timeout(), Duration::from_secs(25));
    assert_eq!(cfg.safety_margin(), Duration::from_secs(2));
    assert_eq!(cfg.store, StoreBackendConfig::InMemory);
}

#[test]
fn test_invalid_interval() {
    let cfg = TaskerConfig {
        periodic_interval_secs: 0,
        ..TaskerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_timeout_must_fit_interval() {
    let cfg = TaskerConfig {
        periodic_interval_secs: 10,
        periodic_timeout_secs: 10,
        ..TaskerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_threshold() {
    for threshold in [0.0, 1.5, -0.2] {
        let cfg = TaskerConfig {
            memory_threshold: threshold,
            ..TaskerConfig::default()
        };
        assert!(cfg.validate().is_err(), "threshold {threshold} accepted");
    }
}

#[test]
fn test_invalid_max_notices() {
    let cfg = TaskerConfig {
        max_notices: 0,
        ..TaskerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_from_json_str() {
    let json = r#"
    {
        "enable_cron": true,
        "memory_limit_bytes": 134217728,
        "store": { "file": { "path": "/var/lib/tasker/tasks.jsonl" } }
    }
    "#;
    let cfg = TaskerConfig::from_json_str(json).expect("valid config");
    assert!(cfg.enable_cron);
    assert_eq!(cfg.periodic_interval_secs, 30);
    assert_eq!(cfg.safe_memory_limit(), Some(134_217_728 - 5 * 1024 * 1024));
    assert_eq!(
        cfg.store,
        StoreBackendConfig::File {
            path: PathBuf::from("/var/lib/tasker/tasks.jsonl")
        }
    );
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(TaskerConfig::from_json_str(r#"{ "http_timeout_secs": 0 }"#).is_err());
    assert!(TaskerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_from_vars_overrides_defaults() {
    let cfg = TaskerConfig::from_vars(vars(&[
        ("TASKER_ENABLE_CRON", "yes"),
        ("TASKER_DEBUG", "1"),
        ("TASKER_HTTP_TIMEOUT_SECS", "20"),
        ("TASKER_MEMORY_THRESHOLD", "0.5"),
        ("TASKER_STORE_PATH", "/tmp/tasks.jsonl"),
        ("UNRELATED", "ignored"),
    ]))
    .unwrap();
    assert!(cfg.enable_cron);
    assert!(cfg.debug);
    assert_eq!(cfg.http_timeout(), Duration::from_secs(20));
    assert!((cfg.memory_threshold - 0.5).abs() < f64::EPSILON);
    assert!(matches!(cfg.store, StoreBackendConfig::File { .. }));
}

#[test]
fn test_from_vars_rejects_garbage() {
    assert!(TaskerConfig::from_vars(vars(&[("TASKER_DEBUG", "maybe")])).is_err());
    assert!(TaskerConfig::from_vars(vars(&[("TASKER_MAX_NOTICES", "lots")])).is_err());
    assert!(TaskerConfig::from_vars(vars(&[("TASKER_PERIODIC_TIMEOUT_SECS", "60")])).is_err());
}
