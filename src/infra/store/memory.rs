//! In-memory task store.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::core::{Task, TaskField, TaskId, TaskSelector, TaskStore, TaskerError};

/// Task store held in process memory, for tests and single-process hosts.
///
/// Records are kept in a `BTreeMap` so that `find` returns them in id order.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: TaskId,
    tasks: BTreeMap<TaskId, Task>,
}

impl InMemoryTaskStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, trashed ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().tasks.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskStore for InMemoryTaskStore {
    fn insert(&self, mut task: Task) -> Result<Task, TaskerError> {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        task.id = inner.next_id;
        inner.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    fn get(&self, id: TaskId) -> Result<Option<Task>, TaskerError> {
        Ok(self.inner.read().tasks.get(&id).cloned())
    }

    fn find(&self, selector: &TaskSelector) -> Result<Vec<Task>, TaskerError> {
        Ok(self
            .inner
            .read()
            .tasks
            .values()
            .filter(|t| selector.matches(t))
            .cloned()
            .collect())
    }

    fn save(&self, task: &Task, fields: Option<&[TaskField]>) -> Result<(), TaskerError> {
        let mut inner = self.inner.write();
        let stored = inner
            .tasks
            .get_mut(&task.id)
            .ok_or(TaskerError::NotFound(task.id))?;
        match fields {
            Some(fields) => stored.copy_fields(task, fields),
            None => *stored = task.clone(),
        }
        Ok(())
    }
}
