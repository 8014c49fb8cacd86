//! Error types for task engine operations.

use thiserror::Error;

use crate::core::task::TaskId;

/// Errors produced by the task engine and its collaborators.
///
/// Execution-time variants (`Requirement`, `Execution`, `Timeout`, `Fatal`)
/// never reach trigger callers: the executor turns them into state
/// transitions and notices. They are still typed so hosts calling the
/// lower-level API can match on them.
#[derive(Debug, Error)]
pub enum TaskerError {
    /// Invalid target or context at creation; no record was produced.
    #[error("creation error: {0}")]
    Creation(String),
    /// Target or context vanished before the first increment.
    #[error("requirement error: {0}")]
    Requirement(String),
    /// The callable raised an error.
    #[error("execution fault: {0}")]
    Execution(String),
    /// The increment outlived its deadline.
    #[error("time limit expired")]
    Timeout,
    /// The callable terminated abnormally (panic or process death).
    #[error("fatal fault: {0}")]
    Fatal(String),
    /// A caller passed something the engine cannot use.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// No task record with this id.
    #[error("task {0} not found")]
    NotFound(TaskId),
    /// Task data could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    /// Store-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// Configuration rejected by validation.
    #[error("config invalid: {0}")]
    Config(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
