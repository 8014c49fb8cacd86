//! Tests for error types

use prometheus_tasker::core::{AppResult, TaskerError};

#[test]
fn test_creation_error() {
    let err = TaskerError::Creation("bad target".to_string());
    assert_eq!(format!("{}", err), "creation error: bad target");
}

#[test]
fn test_timeout_error() {
    let err = TaskerError::Timeout;
    assert_eq!(format!("{}", err), "time limit expired");
}

#[test]
fn test_fatal_error() {
    let err = TaskerError::Fatal("stack overflow".to_string());
    assert_eq!(format!("{}", err), "fatal fault: stack overflow");
}

#[test]
fn test_not_found_error() {
    let err = TaskerError::NotFound(17);
    assert_eq!(format!("{}", err), "task 17 not found");
}

#[test]
fn test_backend_error() {
    let err = TaskerError::Backend("connection failed".to_string());
    assert_eq!(format!("{}", err), "backend error: connection failed");
}

#[test]
fn test_codec_error_from_serde() {
    let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: TaskerError = source.into();
    assert!(matches!(err, TaskerError::Codec(_)));
    assert!(err.to_string().starts_with("codec error: "));
}

#[test]
fn test_app_result_wraps_tasker_error() {
    fn load() -> AppResult<()> {
        Err(TaskerError::Config("bad".into()).into())
    }
    let err = load().unwrap_err();
    assert_eq!(err.to_string(), "config invalid: bad");
    assert!(err.downcast_ref::<TaskerError>().is_some());
}
