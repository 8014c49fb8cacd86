//! Task record store port and the selector language used to query it.

use std::fmt;
use std::str::FromStr;

use crate::core::task::{ContextId, Task, TaskField, TaskId, TaskState};
use crate::core::TaskerError;

/// Durable storage of task records.
///
/// Implementations must be visible to every scheduler that may run tasks,
/// including other OS processes; `get` must bypass any cache so that state
/// changes made elsewhere are observed.
pub trait TaskStore: Send + Sync {
    /// Persist a new record, assigning its id. The id on `task` is ignored.
    fn insert(&self, task: Task) -> Result<Task, TaskerError>;

    /// Fresh read of a record.
    fn get(&self, id: TaskId) -> Result<Option<Task>, TaskerError>;

    /// All records matching `selector`, in ascending id order.
    fn find(&self, selector: &TaskSelector) -> Result<Vec<Task>, TaskerError>;

    /// First record matching `selector`.
    fn find_one(&self, selector: &TaskSelector) -> Result<Option<Task>, TaskerError> {
        Ok(self.find(selector)?.into_iter().next())
    }

    /// Save a record. With `fields`, only those fields are written and the
    /// rest of the stored record is left as is.
    fn save(&self, task: &Task, fields: Option<&[TaskField]>) -> Result<(), TaskerError>;
}

/// Predicate over task records.
///
/// Parsed from comma-separated `key=value` / `key!=value` terms:
/// `id`, `state` (name or code), `running` (0/1), `context`, `title`, and
/// `include=trash`. Trashed records are excluded unless asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSelector {
    /// Match only these states (any of them).
    pub states: Vec<TaskState>,
    /// Exclude these states.
    pub exclude_states: Vec<TaskState>,
    /// Match the running flag.
    pub running: Option<bool>,
    /// Match the context id.
    pub context: Option<ContextId>,
    /// Match this exact id.
    pub id: Option<TaskId>,
    /// Exclude these ids.
    pub exclude_ids: Vec<TaskId>,
    /// Match this exact title.
    pub title: Option<String>,
    /// Include trashed records.
    pub include_trashed: bool,
}

impl TaskSelector {
    /// Selector matching every non-trashed task.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Candidates for a trigger: active and not running.
    #[must_use]
    pub fn runnable() -> Self {
        Self::all().state(TaskState::Active).running(false)
    }

    /// Restrict to a state.
    #[must_use]
    pub fn state(mut self, state: TaskState) -> Self {
        self.states.push(state);
        self
    }

    /// Restrict the running flag.
    #[must_use]
    pub const fn running(mut self, running: bool) -> Self {
        self.running = Some(running);
        self
    }

    /// Restrict to a context.
    #[must_use]
    pub const fn context(mut self, context: ContextId) -> Self {
        self.context = Some(context);
        self
    }

    /// Exclude an id.
    #[must_use]
    pub fn exclude(mut self, id: TaskId) -> Self {
        self.exclude_ids.push(id);
        self
    }

    /// Include trashed records.
    #[must_use]
    pub const fn with_trashed(mut self) -> Self {
        self.include_trashed = true;
        self
    }

    /// Whether `task` satisfies every term.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        (self.include_trashed || !task.trashed)
            && (self.states.is_empty() || self.states.contains(&task.state))
            && !self.exclude_states.contains(&task.state)
            && self.running.is_none_or(|r| task.running == r)
            && self.context.is_none_or(|c| task.context_id == c)
            && self.id.is_none_or(|id| task.id == id)
            && !self.exclude_ids.contains(&task.id)
            && self.title.as_deref().is_none_or(|t| task.title == t)
    }
}

impl From<TaskState> for TaskSelector {
    fn from(state: TaskState) -> Self {
        Self::all().state(state)
    }
}

fn invalid(term: &str, why: &str) -> TaskerError {
    TaskerError::InvalidArgument(format!("selector term '{term}': {why}"))
}

fn parse_flag(term: &str, value: &str) -> Result<bool, TaskerError> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(invalid(term, "expected 0 or 1")),
    }
}

fn parse_id(term: &str, value: &str) -> Result<u64, TaskerError> {
    value.parse().map_err(|_| invalid(term, "expected a numeric id"))
}

impl FromStr for TaskSelector {
    type Err = TaskerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut selector = Self::default();
        for term in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, negated, value) = if let Some((k, v)) = term.split_once("!=") {
                (k.trim(), true, v.trim())
            } else if let Some((k, v)) = term.split_once('=') {
                (k.trim(), false, v.trim())
            } else {
                return Err(invalid(term, "expected key=value"));
            };

            match (key, negated) {
                ("id", false) => selector.id = Some(parse_id(term, value)?),
                ("id", true) => selector.exclude_ids.push(parse_id(term, value)?),
                ("state", _) => {
                    let state = TaskState::parse(value).ok_or_else(|| invalid(term, "unknown state"))?;
                    if negated {
                        selector.exclude_states.push(state);
                    } else {
                        selector.states.push(state);
                    }
                }
                ("running", _) => {
                    let flag = parse_flag(term, value)?;
                    selector.running = Some(flag != negated);
                }
                ("context", false) => selector.context = Some(parse_id(term, value)?),
                ("title", false) => selector.title = Some(value.to_owned()),
                ("include", false) if value == "trash" || value == "all" => {
                    selector.include_trashed = true;
                }
                _ => return Err(invalid(term, "unsupported term")),
            }
        }
        Ok(selector)
    }
}

impl fmt::Display for TaskSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut terms = Vec::new();
        if let Some(id) = self.id {
            terms.push(format!("id={id}"));
        }
        terms.extend(self.exclude_ids.iter().map(|id| format!("id!={id}")));
        terms.extend(self.states.iter().map(|s| format!("state={}", s.code())));
        terms.extend(self.exclude_states.iter().map(|s| format!("state!={}", s.code())));
        if let Some(running) = self.running {
            terms.push(format!("running={}", u8::from(running)));
        }
        if let Some(context) = self.context {
            terms.push(format!("context={context}"));
        }
        if let Some(title) = &self.title {
            terms.push(format!("title={title}"));
        }
        if self.include_trashed {
            terms.push("include=trash".to_owned());
        }
        f.write_str(&terms.join(","))
    }
}
