//! Persisted task record and its lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::data::{self, TaskData};
use crate::core::TaskerError;

/// Stable task identifier assigned by the store.
pub type TaskId = u64;

/// Identifier of the external object a task operates on.
pub type ContextId = u64;

/// Lifecycle state of a task.
///
/// The numeric codes are the ones used by selector shorthands
/// (`state=1` means `Active`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Not set; only seen on malformed records.
    #[default]
    Unknown,
    /// Ready to run.
    Active,
    /// Created or suspended, waiting to be activated.
    Waiting,
    /// Completed; its follow-up tasks have been activated.
    Finished,
    /// Killed by an administrator; progress was reset.
    Killed,
    /// Failed to execute; needs administrative re-activation.
    Failed,
}

impl TaskState {
    /// Numeric state code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Active => 1,
            Self::Waiting => 2,
            Self::Finished => 3,
            Self::Killed => 4,
            Self::Failed => 5,
        }
    }

    /// State for a numeric code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::Active),
            2 => Some(Self::Waiting),
            3 => Some(Self::Finished),
            4 => Some(Self::Killed),
            5 => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal for scheduling purposes: only administration moves it on.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Killed | Self::Failed)
    }

    /// Lowercase name, as accepted by selectors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Active => "active",
            Self::Waiting => "waiting",
            Self::Finished => "finished",
            Self::Killed => "killed",
            Self::Failed => "failed",
        }
    }

    /// Parse a state name or numeric code.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Ok(code) = input.parse::<u8>() {
            return Self::from_code(code);
        }
        [
            Self::Unknown,
            Self::Active,
            Self::Waiting,
            Self::Finished,
            Self::Killed,
            Self::Failed,
        ]
        .into_iter()
        .find(|s| s.as_str().eq_ignore_ascii_case(input))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record fields that can be saved individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskField {
    /// `title`
    Title,
    /// `state`
    State,
    /// `running`
    Running,
    /// `progress`
    Progress,
    /// `data`
    Data,
    /// `log`
    Log,
    /// `trashed`
    Trashed,
}

/// A persisted unit of resumable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier assigned at creation.
    pub id: TaskId,
    /// Human-readable label.
    pub title: String,
    /// Hash of the encoded data at creation time (advisory).
    pub signature: String,
    /// Lifecycle state.
    pub state: TaskState,
    /// True only while an increment is in flight.
    pub running: bool,
    /// Percentage of `records_processed / max_records`, two decimals.
    pub progress: f64,
    /// The object the task operates on.
    pub context_id: ContextId,
    /// Encoded [`TaskData`].
    pub data: String,
    /// Accumulated log text.
    #[serde(default)]
    pub log: String,
    /// Moved to the trash by an administrator.
    #[serde(default)]
    pub trashed: bool,
    /// Creation timestamp in milliseconds since epoch.
    pub created_at_ms: u128,
}

impl Task {
    /// Whether the task is ready to run.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TaskState::Active
    }

    /// Decode the data payload.
    pub fn decode_data(&self) -> Result<TaskData, TaskerError> {
        data::decode(&self.data)
    }

    /// Replace the data payload.
    pub fn encode_data(&mut self, data: &TaskData) -> Result<(), TaskerError> {
        self.data = data::encode(data)?;
        Ok(())
    }

    /// Copy the listed fields from `other` into `self`.
    pub fn copy_fields(&mut self, other: &Self, fields: &[TaskField]) {
        for field in fields {
            match field {
                TaskField::Title => self.title.clone_from(&other.title),
                TaskField::State => self.state = other.state,
                TaskField::Running => self.running = other.running,
                TaskField::Progress => self.progress = other.progress,
                TaskField::Data => self.data.clone_from(&other.data),
                TaskField::Log => self.log.clone_from(&other.log),
                TaskField::Trashed => self.trashed = other.trashed,
            }
        }
    }
}
