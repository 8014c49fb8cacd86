//! API-facing response models for admin surfaces.

use serde::{Deserialize, Serialize};

use crate::core::{Task, TaskId, TaskSelector, TaskState, Tasker, TaskerError};

/// Task listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Task identifier.
    pub id: TaskId,
    /// Title.
    pub title: String,
    /// Current state.
    pub state: TaskState,
    /// Whether an increment is in flight.
    pub running: bool,
    /// Progress percentage.
    pub progress: f64,
    /// `"2 error(s) and 1 warning(s)"`-style log summary.
    pub log_summary: String,
    /// Whether the task is in the trash.
    pub trashed: bool,
}

impl TaskSummary {
    /// Summarize a task record.
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            state: task.state,
            running: task.running,
            progress: task.progress,
            log_summary: crate::core::notice::log_summary(&task.log, true, true),
            trashed: task.trashed,
        }
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Number of tasks waiting to be picked up.
    pub runnable: usize,
}

/// List tasks matching a selector string (empty lists everything not trashed).
pub fn list_tasks(tasker: &Tasker, filter: &str) -> Result<Vec<TaskSummary>, TaskerError> {
    Ok(tasker
        .get_tasks_matching(filter)?
        .iter()
        .map(TaskSummary::from_task)
        .collect())
}

/// Return a health payload; `ok` is false when the store cannot be queried.
pub fn health(tasker: &Tasker) -> Health {
    match tasker.get_tasks(TaskSelector::runnable()) {
        Ok(tasks) => Health {
            ok: true,
            runnable: tasks.len(),
        },
        Err(e) => {
            tracing::warn!("health check failed: {}", e);
            Health {
                ok: false,
                runnable: 0,
            }
        }
    }
}
