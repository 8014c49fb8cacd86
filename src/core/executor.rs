//! The run loop and the callable-facing checkpoint API.
//!
//! One call to [`Tasker::execute_task_now`] runs one increment: admission,
//! first-run requirement and dependency checks, the `running` gate, the
//! callable itself under a deadline and a panic trap, and the final persist.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt as _;
use tokio_util::sync::CancellationToken;
use chrono::Utc;
use tracing::Instrument as _;
use uuid::Uuid;

use crate::core::data::TaskData;
use crate::core::guard::{Refusal, RunParams};
use crate::core::notice::{render_log_lines, Notice, NoticeLevel};
use crate::core::task::{Task, TaskField, TaskState};
use crate::core::tasker::{refusal_notice, Tasker};
use crate::core::TaskerError;

/// What a single increment did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// The guard refused admission.
    Refused(Refusal),
    /// Another scheduler holds the task's `running` flag.
    AlreadyRunning,
    /// Callable or context vanished before the first increment; task failed.
    RequirementsUnmet,
    /// A dependency is not finished; task moved back to `Waiting`.
    DependenciesUnmet,
    /// The callable reported the task done.
    Finished,
    /// The callable yielded with work left; task stays `Active`.
    Yielded,
    /// A stop request or an external state change ended the increment.
    Stopped,
    /// The callable failed, returned an error, or panicked.
    Failed,
    /// The deadline expired before the callable returned.
    TimedOut,
    /// The store failed before the callable could be invoked.
    Aborted(String),
}

impl IncrementOutcome {
    /// Whether the callable was invoked.
    #[must_use]
    pub const fn executed(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Yielded | Self::Stopped | Self::Failed | Self::TimedOut
        )
    }
}

/// Options for [`Increment::save_progress_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Re-read `state` from the store to notice external suspend/kill.
    pub update_state: bool,
    /// Dispatch pending stop requests.
    pub check_events: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            update_state: true,
            check_events: true,
        }
    }
}

/// A running increment, handed to the callable.
pub struct Increment<'a> {
    tasker: &'a Tasker,
    task: Task,
    params: RunParams,
    stop: CancellationToken,
    id: Uuid,
    state_dirty: bool,
    pending: Vec<Notice>,
}

impl<'a> Increment<'a> {
    fn new(tasker: &'a Tasker, task: Task, params: RunParams, stop: CancellationToken, id: Uuid) -> Self {
        Self {
            tasker,
            task,
            params,
            stop,
            id,
            state_dirty: false,
            pending: Vec::new(),
        }
    }

    /// The working copy of the task record.
    #[must_use]
    pub const fn task(&self) -> &Task {
        &self.task
    }

    /// Runtime parameters: invoker, deadline, memory ceiling.
    #[must_use]
    pub const fn params(&self) -> &RunParams {
        &self.params
    }

    /// Unique id of this increment, also recorded on its tracing span.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current in-memory state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.task.state
    }

    /// Token cancelled when a stop is requested for this task.
    #[must_use]
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Dispatch pending stop requests, then run the guard.
    ///
    /// Callables check this between units of work and return once it is
    /// false.
    pub fn allowed_to_execute(&mut self) -> bool {
        if let Err(e) = self.check_events() {
            let text = format!("Task '{}' could not be suspended: {e}", self.task.title);
            self.note(NoticeLevel::Error, text);
            return false;
        }
        match self.tasker.guard.check(&self.task, &self.params) {
            Ok(()) => true,
            Err(refusal) => {
                let text = refusal_notice(&self.task, refusal);
                self.note(NoticeLevel::Debug, text);
                false
            }
        }
    }

    /// Checkpoint with state refresh and event dispatch.
    pub fn save_progress(&mut self, data: &TaskData) -> Result<(), TaskerError> {
        self.save_progress_with(data, SaveOptions::default())
    }

    /// Checkpoint: recompute progress, persist data, flush notices into the
    /// log, then optionally dispatch stop requests and refresh `state`.
    pub fn save_progress_with(&mut self, data: &TaskData, options: SaveOptions) -> Result<(), TaskerError> {
        let mut fields = vec![TaskField::Data, TaskField::Log];
        if let Some(progress) = data.progress_percent() {
            self.task.progress = progress;
            fields.push(TaskField::Progress);
        }
        self.task.encode_data(data)?;
        self.task.log.push_str(&render_log_lines(&self.pending));
        self.pending.clear();
        self.tasker.store.save(&self.task, Some(&fields))?;

        if options.check_events {
            self.check_events()?;
        }
        if options.update_state {
            if let Some(stored) = self.tasker.store.get(self.task.id)? {
                if stored.state != self.task.state {
                    tracing::debug!(
                        task_id = self.task.id,
                        "state changed externally: {} -> {}",
                        self.task.state,
                        stored.state
                    );
                    self.task.state = stored.state;
                }
            }
        }
        Ok(())
    }

    /// Checkpoint once `records_processed` reaches the milestone.
    ///
    /// Fires once per milestone value for the life of the task; the fired
    /// value is kept in `data`, so raising the milestone re-arms it. Returns
    /// whether it fired.
    pub fn save_progress_at_milestone(&mut self, data: &mut TaskData) -> Result<bool, TaskerError> {
        let Some(milestone) = data.milestone else {
            return Ok(false);
        };
        if data.records_processed < milestone || data.milestone_fired == Some(milestone) {
            return Ok(false);
        }
        data.milestone_fired = Some(milestone);
        self.save_progress(data)?;
        Ok(true)
    }

    /// Apply a pending stop request: an active task goes back to `Waiting`.
    ///
    /// A state already changed in the store by whoever requested the stop
    /// (a kill, a suspend) is adopted as is.
    pub fn check_events(&mut self) -> Result<(), TaskerError> {
        if !self.stop.is_cancelled() || self.task.state != TaskState::Active {
            return Ok(());
        }
        match self.tasker.store.get(self.task.id)?.map(|t| t.state) {
            Some(stored) if stored != TaskState::Active => self.task.state = stored,
            _ => {
                let text = format!("Task '{}' was suspended by user request.", self.task.title);
                self.note(NoticeLevel::Message, text);
                self.set_state(TaskState::Waiting);
                self.tasker.store.save(&self.task, Some(&[TaskField::State]))?;
            }
        }
        Ok(())
    }

    /// Record an informational notice.
    pub fn message(&mut self, text: impl Into<String>) {
        self.note(NoticeLevel::Message, text);
    }

    /// Record a warning.
    pub fn warning(&mut self, text: impl Into<String>) {
        self.note(NoticeLevel::Warning, text);
    }

    /// Record an error.
    pub fn error(&mut self, text: impl Into<String>) {
        self.note(NoticeLevel::Error, text);
    }

    /// Journal a notice and hold it for this task's log.
    fn note(&mut self, level: NoticeLevel, text: impl Into<String>) {
        let notice = Notice::new(level, text);
        if self.tasker.notices.record(&notice) {
            self.pending.push(notice);
        }
    }

    fn set_state(&mut self, state: TaskState) {
        self.task.state = state;
        self.state_dirty = true;
    }

    /// Final persist: data and log, state if this increment changed it, then
    /// release the `running` gate. Every step is attempted.
    ///
    /// A task killed while the increment ran keeps the reset the kill made.
    /// Returns the state the record ends in (`None` if its write failed)
    /// alongside the persist result.
    fn conclude(mut self, data: &TaskData) -> (Option<TaskState>, Result<(), TaskerError>) {
        let killed = matches!(
            self.tasker.store.get(self.task.id),
            Ok(Some(stored)) if stored.state == TaskState::Killed
        );
        let saved = if killed {
            Ok(())
        } else {
            self.save_progress_with(
                data,
                SaveOptions {
                    update_state: false,
                    check_events: false,
                },
            )
        };
        let state_saved = if self.state_dirty && !killed {
            self.tasker.store.save(&self.task, Some(&[TaskField::State]))
        } else {
            Ok(())
        };
        let final_state = if killed {
            Some(TaskState::Killed)
        } else {
            state_saved.is_ok().then_some(self.task.state)
        };
        self.task.running = false;
        let released = self.tasker.store.save(&self.task, Some(&[TaskField::Running]));
        (final_state, saved.and(state_saved).and(released))
    }
}

impl std::fmt::Debug for Increment<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Increment")
            .field("id", &self.id)
            .field("task_id", &self.task.id)
            .field("state", &self.task.state)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

impl Tasker {
    /// Run one increment of `task`.
    ///
    /// Never fails: every fault becomes a state transition, notices, and the
    /// returned outcome.
    pub async fn execute_task_now(&self, task: Task, params: RunParams) -> IncrementOutcome {
        let increment_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "increment",
            task_id = task.id,
            invoker = %params.invoker,
            increment = %increment_id
        );
        self.run_increment(task, params, increment_id)
            .instrument(span)
            .await
    }

    fn abort(&self, task: &Task, error: &TaskerError) -> IncrementOutcome {
        self.notices
            .error(format!("Task '{}' could not be executed: {error}", task.title));
        IncrementOutcome::Aborted(error.to_string())
    }

    fn settle(&self, task: &mut Task, state: TaskState, outcome: IncrementOutcome) -> IncrementOutcome {
        task.state = state;
        match self.store.save(task, Some(&[TaskField::State])) {
            Ok(()) => outcome,
            Err(e) => self.abort(task, &e),
        }
    }

    async fn run_increment(&self, task: Task, params: RunParams, increment_id: Uuid) -> IncrementOutcome {
        let mut task = match self.store.get(task.id) {
            Ok(Some(fresh)) => fresh,
            Ok(None) => return self.abort(&task, &TaskerError::NotFound(task.id)),
            Err(e) => return self.abort(&task, &e),
        };
        if task.running {
            self.notices.warning(format!(
                "Task '{}' is already running. Will not execute again.",
                task.title
            ));
            return IncrementOutcome::AlreadyRunning;
        }
        if let Err(refusal) = self.admit(&task, &params) {
            return IncrementOutcome::Refused(refusal);
        }

        let mut data = match task.decode_data() {
            Ok(data) => data,
            Err(e) => {
                self.notices
                    .error(format!("Task '{}' has unreadable data: {e}", task.title));
                return self.settle(&mut task, TaskState::Failed, IncrementOutcome::RequirementsUnmet);
            }
        };
        let first_run = data.records_processed == 0;
        if first_run {
            self.notices
                .debug(format!("Checking requirements for '{}'.", task.title));
        }
        let Ok((callable, context)) = self.resolve_target(&task, &data) else {
            return self.settle(&mut task, TaskState::Failed, IncrementOutcome::RequirementsUnmet);
        };
        if first_run && !self.check_task_dependencies(&task, &data) {
            return self.settle(&mut task, TaskState::Waiting, IncrementOutcome::DependenciesUnmet);
        }

        task.running = true;
        if let Err(e) = self.store.save(&task, Some(&[TaskField::Running])) {
            return self.abort(&task, &e);
        }
        let registration = self.interrupts.register(task.id);
        let deadline = params.deadline;
        let verb = if first_run { "started" } else { "continued" };
        let started = format!("Task '{}' {verb} at {}.", task.title, Utc::now().to_rfc2822());
        let executing = format!(
            "Tasker is executing '{}' requested by {}.",
            task.title, params.invoker
        );
        let mut increment = Increment::new(self, task, params, registration.token(), increment_id);
        increment.note(NoticeLevel::Debug, started);
        increment.note(NoticeLevel::Debug, executing);

        let invocation = AssertUnwindSafe(callable.run(&context, &mut data, &mut increment)).catch_unwind();
        let result = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, invocation).await.ok(),
            None => Some(invocation.await),
        };
        drop(registration);

        let title = increment.task.title.clone();
        let outcome = match result {
            None => {
                increment.set_state(TaskState::Failed);
                increment.error(format!("Task '{title}': {}.", TaskerError::Timeout));
                increment.message(
                    "Either the limit is too low (check the configuration) or the task does not check its limits.",
                );
                IncrementOutcome::TimedOut
            }
            Some(Err(payload)) => {
                increment.set_state(TaskState::Failed);
                let fault = TaskerError::Fatal(panic_message(payload.as_ref()));
                increment.error(format!("Task '{title}' encountered a {fault} and it is stopped."));
                IncrementOutcome::Failed
            }
            Some(Ok(Err(e))) => {
                increment.set_state(TaskState::Failed);
                let fault = TaskerError::Execution(format!("{e:#}"));
                increment.error(format!("Task '{title}' failed with {fault}"));
                IncrementOutcome::Failed
            }
            Some(Ok(Ok(false))) => {
                increment.set_state(TaskState::Failed);
                increment.error(format!("Task '{title}' failed."));
                IncrementOutcome::Failed
            }
            Some(Ok(Ok(true))) if data.task_done => {
                increment.set_state(TaskState::Finished);
                increment.note(NoticeLevel::Debug, format!("Task '{title}' has finished."));
                IncrementOutcome::Finished
            }
            Some(Ok(Ok(true))) if increment.task.state == TaskState::Active => {
                increment.note(NoticeLevel::Debug, format!("Task '{title}' yielded."));
                IncrementOutcome::Yielded
            }
            Some(Ok(Ok(true))) => IncrementOutcome::Stopped,
        };

        let (final_state, persisted) = increment.conclude(&data);
        if let Err(e) = persisted {
            self.notices
                .error(format!("Task '{title}' could not persist its results: {e}"));
        }
        match (outcome, final_state) {
            (IncrementOutcome::Finished | IncrementOutcome::Yielded, Some(TaskState::Killed)) => {
                IncrementOutcome::Stopped
            }
            (IncrementOutcome::Finished, Some(TaskState::Finished)) => {
                if let Some(refs) = &data.next_task {
                    self.activate_task_set(refs.ids());
                }
                IncrementOutcome::Finished
            }
            (outcome, _) => outcome,
        }
    }
}
