//! The task engine: creation, queries, the state machine, and chaining.
//!
//! Execution itself lives in [`crate::core::executor`]; triggers in
//! [`crate::runtime::trigger`].

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::TaskerConfig;
use crate::core::data::{self, TaskData, TaskRefs};
use crate::core::guard::{ExecutionGuard, Refusal, RunParams};
use crate::core::interrupt::Interrupts;
use crate::core::notice::{self, Notice, Notices};
use crate::core::registry::{CallableRegistry, ContextRef, ContextSource, Locator, TaskCallable};
use crate::core::store::{TaskSelector, TaskStore};
use crate::core::task::{ContextId, Task, TaskField, TaskId, TaskState};
use crate::core::TaskerError;
use crate::util::clock::now_ms;
use crate::util::memory::{MemoryProbe, ProcessMemoryProbe};

/// Request to create a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Callable to run.
    pub target: Locator,
    /// Object the task operates on.
    pub context: ContextId,
    /// Human-readable label.
    pub title: String,
    /// Initial data; may carry `dep`, `next_task` and `milestone`.
    pub data: Map<String, Value>,
}

impl NewTask {
    /// Start a creation request.
    pub fn new(target: Locator, context: ContextId, title: impl Into<String>) -> Self {
        Self {
            target,
            context,
            title: title.into(),
            data: Map::new(),
        }
    }

    /// Set a data field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Require `id` to finish before this task can be activated.
    #[must_use]
    pub fn depends_on(mut self, id: TaskId) -> Self {
        push_ref(&mut self.data, "dep", id);
        self
    }

    /// Activate `id` when this task finishes.
    #[must_use]
    pub fn followed_by(mut self, id: TaskId) -> Self {
        push_ref(&mut self.data, "next_task", id);
        self
    }
}

fn push_ref(data: &mut Map<String, Value>, key: &str, id: TaskId) {
    match data.remove(key) {
        Some(Value::Array(mut ids)) => {
            ids.push(id.into());
            data.insert(key.to_owned(), Value::Array(ids));
        }
        Some(existing) => {
            data.insert(key.to_owned(), Value::Array(vec![existing, id.into()]));
        }
        None => {
            data.insert(key.to_owned(), id.into());
        }
    }
}

/// The task engine.
///
/// One `Tasker` serves every trigger of a process; share it behind an `Arc`.
pub struct Tasker {
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) registry: Arc<CallableRegistry>,
    pub(crate) contexts: Arc<dyn ContextSource>,
    pub(crate) guard: ExecutionGuard,
    pub(crate) notices: Notices,
    pub(crate) interrupts: Interrupts,
    pub(crate) config: TaskerConfig,
}

impl Tasker {
    /// Create an engine measuring memory with [`ProcessMemoryProbe`].
    pub fn new(
        config: TaskerConfig,
        store: Arc<dyn TaskStore>,
        registry: Arc<CallableRegistry>,
        contexts: Arc<dyn ContextSource>,
    ) -> Self {
        let guard = ExecutionGuard::new(
            config.safety_margin(),
            config.memory_threshold,
            Arc::new(ProcessMemoryProbe),
        );
        Self {
            store,
            registry,
            contexts,
            guard,
            notices: Notices::new(config.max_notices, config.debug),
            interrupts: Interrupts::new(),
            config,
        }
    }

    /// Replace the memory probe used by the guard.
    #[must_use]
    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.guard = ExecutionGuard::new(
            self.config.safety_margin(),
            self.config.memory_threshold,
            probe,
        );
        self
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &TaskerConfig {
        &self.config
    }

    /// Callable registry.
    #[must_use]
    pub fn registry(&self) -> &CallableRegistry {
        &self.registry
    }

    /// Notice buffers.
    #[must_use]
    pub const fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Take every notice recorded since the last drain.
    pub fn drain_notices(&self) -> Vec<Notice> {
        self.notices.drain_journal()
    }

    /// Create a task in the `Waiting` state.
    ///
    /// Fails with [`TaskerError::Creation`] (and records no task) when the
    /// target is not a registered, enabled callable or the context object
    /// does not exist.
    pub fn create_task(&self, request: NewTask) -> Result<Task, TaskerError> {
        let NewTask {
            target,
            context,
            title,
            data,
        } = request;

        let context_ref = self.contexts.resolve(context);
        let context_label = context_ref
            .as_ref()
            .map_or_else(|| format!("#{context}"), |c| c.title.clone());
        if context_ref.is_none() || !self.registry.contains(&target) {
            let msg = format!(
                "Error creating new task '{title}' for '{context_label}' executed by {target}."
            );
            self.notices.error(msg.clone());
            return Err(TaskerError::Creation(msg));
        }

        let (data, warnings) = TaskData::for_new_task(&target, context, data);
        for warning in warnings {
            self.notices
                .warning(format!("{warning} (task '{title}')"));
        }
        let encoded = data::encode(&data)?;
        let signature = data::signature(&encoded);

        if let Some(existing) = self.find_duplicate(context, &target)? {
            self.notices.warning(format!(
                "The same task '{}' exists for '{context_label}' and executed by {target}.",
                existing.title
            ));
        }

        let task = self.store.insert(Task {
            id: 0,
            title,
            signature,
            state: TaskState::Waiting,
            running: false,
            progress: 0.0,
            context_id: context,
            data: encoded,
            log: String::new(),
            trashed: false,
            created_at_ms: now_ms(),
        })?;
        self.notices.debug(format!(
            "Created task '{}' for '{context_label}' executed by {target}().",
            task.title
        ));
        Ok(task)
    }

    fn find_duplicate(&self, context: ContextId, target: &Locator) -> Result<Option<Task>, TaskerError> {
        let candidates = self.store.find(&TaskSelector::all().context(context))?;
        Ok(candidates.into_iter().find(|t| {
            !t.state.is_terminal()
                && t.decode_data().is_ok_and(|d| d.locator() == *target)
        }))
    }

    /// Tasks matching a selector (or a state shorthand).
    pub fn get_tasks(&self, selector: impl Into<TaskSelector>) -> Result<Vec<Task>, TaskerError> {
        self.store.find(&selector.into())
    }

    /// Tasks matching a selector string such as `"state=1,running=0"`.
    pub fn get_tasks_matching(&self, filter: &str) -> Result<Vec<Task>, TaskerError> {
        self.get_tasks(filter.parse::<TaskSelector>()?)
    }

    /// Direct lookup. Missing records (and store failures, which are logged)
    /// yield `None`.
    pub fn get_task_by_id(&self, id: TaskId) -> Option<Task> {
        match self.store.get(id) {
            Ok(task) => task,
            Err(e) => {
                tracing::error!("failed to load task {}: {}", id, e);
                None
            }
        }
    }

    /// Whether the task is ready to run.
    #[must_use]
    pub fn is_active(&self, task: &Task) -> bool {
        task.is_active()
    }

    /// Move a task to `Active` if its dependencies are met.
    ///
    /// Returns `Ok(false)` (and leaves the state alone) otherwise.
    pub fn activate_task(&self, task: &mut Task) -> Result<bool, TaskerError> {
        let data = task.decode_data()?;
        if !self.check_task_dependencies(task, &data) {
            self.notices.warning(format!(
                "Task '{}' cannot be activated because one of its dependencies is not met.",
                task.title
            ));
            return Ok(false);
        }
        task.state = TaskState::Active;
        self.store.save(task, Some(&[TaskField::State]))?;
        self.notices
            .debug(format!("Task '{}' has been activated.", task.title));
        Ok(true)
    }

    /// Activate several tasks by id. True only if every one was activated.
    pub fn activate_task_set(&self, ids: impl IntoIterator<Item = TaskId>) -> bool {
        let mut all = true;
        for id in ids {
            let activated = match self.get_task_by_id(id) {
                Some(mut task) => self.activate_task(&mut task).unwrap_or_else(|e| {
                    self.notices
                        .error(format!("Failed to activate task '{}': {e}", task.title));
                    false
                }),
                None => {
                    self.notices
                        .error(format!("Cannot activate task {id}: no such task."));
                    false
                }
            };
            all &= activated;
        }
        all
    }

    /// Suspend (`kill == false`) or kill a task.
    ///
    /// Killing always resets progress; `reset` resets it on suspend too. An
    /// increment running the task in this process is asked to stop.
    pub fn stop_task(&self, task: &mut Task, kill: bool, reset: bool) -> Result<(), TaskerError> {
        if kill {
            task.state = TaskState::Killed;
            self.store.save(task, Some(&[TaskField::State]))?;
            self.notices
                .debug(format!("Task '{}' has been killed.", task.title));
        } else {
            task.state = TaskState::Waiting;
            self.store.save(task, Some(&[TaskField::State]))?;
            self.notices
                .debug(format!("Task '{}' has been suspended.", task.title));
        }
        self.interrupts.request_stop(task.id);
        if kill || reset {
            self.reset_progress(task)?;
        }
        Ok(())
    }

    /// Kill a task and move it to the trash. The record is kept.
    pub fn trash_task(&self, task: &mut Task) -> Result<(), TaskerError> {
        task.state = TaskState::Killed;
        task.trashed = true;
        self.store
            .save(task, Some(&[TaskField::State, TaskField::Trashed]))?;
        self.interrupts.request_stop(task.id);
        self.reset_progress(task)?;
        self.notices
            .debug(format!("Task '{}' has been trashed.", task.title));
        Ok(())
    }

    /// Zero progress counters and clear the log.
    pub fn reset_progress(&self, task: &mut Task) -> Result<(), TaskerError> {
        let mut data = task.decode_data()?;
        data.reset_progress();
        task.encode_data(&data)?;
        task.progress = 0.0;
        task.log.clear();
        self.store.save(
            task,
            Some(&[TaskField::Progress, TaskField::Data, TaskField::Log]),
        )
    }

    /// Add `next` as a follow-up of `task`; activated when `task` finishes.
    pub fn add_next_task(&self, task: &mut Task, next: TaskId) -> Result<(), TaskerError> {
        let other = self.linkable(task, next, "follow-up task")?;
        let mut data = task.decode_data()?;
        data.next_task = Some(match data.next_task.take() {
            Some(refs) => refs.with(next),
            None => TaskRefs::One(next),
        });
        task.encode_data(&data)?;
        self.store.save(task, Some(&[TaskField::Data]))?;
        self.notices.debug(format!(
            "Added '{}' as a follow-up task to '{}'.",
            other.title, task.title
        ));
        Ok(())
    }

    /// Make `task` wait for `dependency` to finish before activation.
    pub fn add_dependency(&self, task: &mut Task, dependency: TaskId) -> Result<(), TaskerError> {
        let other = self.linkable(task, dependency, "dependency")?;
        let mut data = task.decode_data()?;
        data.dep = Some(match data.dep.take() {
            Some(refs) => refs.with(dependency),
            None => TaskRefs::One(dependency),
        });
        task.encode_data(&data)?;
        self.store.save(task, Some(&[TaskField::Data]))?;
        self.notices.debug(format!(
            "Added '{}' as a dependency to '{}'.",
            other.title, task.title
        ));
        Ok(())
    }

    fn linkable(&self, task: &Task, other: TaskId, what: &str) -> Result<Task, TaskerError> {
        let found = (other != task.id)
            .then(|| self.get_task_by_id(other))
            .flatten();
        found.ok_or_else(|| {
            let msg = format!("Invalid {what} {other} provided for '{}'.", task.title);
            self.notices.error(msg.clone());
            TaskerError::InvalidArgument(msg)
        })
    }

    /// Whether every dependency of the task is finished (or gone).
    ///
    /// All dependencies are examined so that each unmet one is reported.
    pub fn check_task_dependencies(&self, task: &Task, data: &TaskData) -> bool {
        let Some(deps) = &data.dep else {
            return true;
        };
        self.notices
            .debug(format!("Checking dependencies for '{}'.", task.title));
        let mut met = true;
        for id in deps.ids() {
            match self.store.get(id) {
                Ok(Some(dep)) if !dep.trashed && dep.state != TaskState::Finished => {
                    self.notices.debug(format!(
                        "'{}' is waiting for '{}' to finish.",
                        task.title, dep.title
                    ));
                    met = false;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(task_id = task.id, dependency = id, error = %e, "dependency lookup failed");
                    self.notices.error(format!(
                        "Could not check dependency {id} of '{}': {e}",
                        task.title
                    ));
                    met = false;
                }
            }
        }
        met
    }

    /// Whether the task's callable and context object still exist.
    pub fn check_task_requirements(&self, task: &Task, data: &TaskData) -> bool {
        self.notices
            .debug(format!("Checking requirements for '{}'.", task.title));
        self.resolve_target(task, data).is_ok()
    }

    pub(crate) fn resolve_target(
        &self,
        task: &Task,
        data: &TaskData,
    ) -> Result<(Arc<dyn TaskCallable>, ContextRef), TaskerError> {
        let locator = data.locator();
        let Some(callable) = self.registry.resolve(&locator) else {
            let msg = format!(
                "Error executing task '{}': callable {locator} not found.",
                task.title
            );
            self.notices.error(msg.clone());
            return Err(TaskerError::Requirement(msg));
        };
        let Some(context) = self.contexts.resolve(data.context_id) else {
            let msg = format!("Error executing task '{}': input object not found.", task.title);
            self.notices.error(msg.clone());
            return Err(TaskerError::Requirement(msg));
        };
        Ok((callable, context))
    }

    /// Guard check with a notice on refusal.
    pub fn allowed_to_execute(&self, task: &Task, params: &RunParams) -> bool {
        self.admit(task, params).is_ok()
    }

    pub(crate) fn admit(&self, task: &Task, params: &RunParams) -> Result<(), Refusal> {
        self.guard
            .check(task, params)
            .inspect_err(|refusal| self.notices.debug(refusal_notice(task, *refusal)))
    }

    /// Summarize `ERROR:`/`WARNING:` markers in the task log.
    #[must_use]
    pub fn log_summary(&self, task: &Task, errors: bool, warnings: bool) -> String {
        notice::log_summary(&task.log, errors, warnings)
    }

    /// Ask the increment running `id` in this process to stop at its next
    /// checkpoint.
    pub fn request_stop(&self, id: TaskId) -> bool {
        self.interrupts.request_stop(id)
    }

    /// Ask every in-flight increment in this process to stop.
    pub fn request_stop_all(&self) -> usize {
        self.interrupts.request_stop_all()
    }

    /// Fail tasks left with `running` set by a process that died mid-increment.
    ///
    /// Call at host startup, before any trigger runs. Increments in flight in
    /// this process are skipped. Returns the number of recovered tasks.
    pub fn recover_interrupted_tasks(&self) -> Result<usize, TaskerError> {
        let stale = self
            .store
            .find(&TaskSelector::all().running(true).with_trashed())?;
        let mut recovered = 0;
        for mut task in stale {
            if self.interrupts.is_in_flight(task.id) {
                continue;
            }
            let msg = format!(
                "Task '{}' was interrupted by an abnormal termination and it is stopped.",
                task.title
            );
            task.running = false;
            task.state = TaskState::Failed;
            task.log.push_str(&format!("ERROR: {msg}\n"));
            self.store.save(
                &task,
                Some(&[TaskField::Running, TaskField::State, TaskField::Log]),
            )?;
            self.notices.error(msg);
            recovered += 1;
        }
        Ok(recovered)
    }
}

/// Text recorded when the guard refuses `task`.
pub(crate) fn refusal_notice(task: &Task, refusal: Refusal) -> String {
    match refusal {
        Refusal::NotActive => format!("Task '{}' is stopped because it is not active.", task.title),
        refusal => format!("Task '{}' is suspended due to {refusal}.", task.title),
    }
}

impl std::fmt::Debug for Tasker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tasker")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}
