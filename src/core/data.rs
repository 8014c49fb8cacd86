//! Task data payload and its textual codec.
//!
//! The payload is the task's mutable working state. Keys the engine manages
//! are typed fields of [`TaskData`]; everything a callable stores for itself
//! lands in [`TaskData::extra`] and round-trips untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest as _, Sha256};

use crate::core::registry::Locator;
use crate::core::task::{ContextId, TaskId};
use crate::core::TaskerError;

/// Keys owned by the engine; caller-supplied values for these are replaced
/// or normalized at creation.
pub const RESERVED_KEYS: &[&str] = &[
    "module",
    "target",
    "method",
    "context_id",
    "pageid",
    "records_processed",
    "max_records",
    "task_done",
    "milestone",
    "milestone_fired",
    "dep",
    "next_task",
];

/// One task id or a list of them, as stored under `dep` and `next_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskRefs {
    /// A single id.
    One(TaskId),
    /// Several ids.
    Many(Vec<TaskId>),
}

impl TaskRefs {
    /// All referenced ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<TaskId> {
        match self {
            Self::One(id) => vec![*id],
            Self::Many(ids) => ids.clone(),
        }
    }

    /// Whether `id` is referenced.
    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        match self {
            Self::One(existing) => *existing == id,
            Self::Many(ids) => ids.contains(&id),
        }
    }

    /// Append `id` unless present; a scalar becomes a list on second insert.
    #[must_use]
    pub fn with(self, id: TaskId) -> Self {
        if self.contains(id) {
            return self;
        }
        match self {
            Self::One(existing) => Self::Many(vec![existing, id]),
            Self::Many(mut ids) => {
                ids.push(id);
                Self::Many(ids)
            }
        }
    }
}

impl From<TaskId> for TaskRefs {
    fn from(id: TaskId) -> Self {
        Self::One(id)
    }
}

/// Decoded task payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskData {
    /// Module part of the callable locator.
    #[serde(default, alias = "target")]
    pub module: Option<String>,
    /// Method part of the callable locator.
    pub method: String,
    /// The object the task operates on.
    #[serde(alias = "pageid")]
    pub context_id: ContextId,
    /// Records handled so far; 0 means the task never ran.
    #[serde(default)]
    pub records_processed: u64,
    /// Total records, 0 while unknown.
    #[serde(default)]
    pub max_records: u64,
    /// Set by the callable once all work is done.
    #[serde(default, with = "flag")]
    pub task_done: bool,
    /// Threshold for checkpointed saves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
    /// Milestone value the last checkpoint fired for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_fired: Option<u64>,
    /// Tasks that must finish before this one may be activated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dep: Option<TaskRefs>,
    /// Tasks activated when this one finishes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_task: Option<TaskRefs>,
    /// Callable-specific fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskData {
    /// Fresh payload for a new task.
    #[must_use]
    pub fn new(locator: &Locator, context_id: ContextId) -> Self {
        Self {
            module: locator.module.clone(),
            method: locator.method.clone(),
            context_id,
            records_processed: 0,
            max_records: 0,
            task_done: false,
            milestone: None,
            milestone_fired: None,
            dep: None,
            next_task: None,
            extra: Map::new(),
        }
    }

    /// Build the payload for a new task from caller-supplied fields.
    ///
    /// Counters are always reset; `dep`/`next_task` are normalized with
    /// [`normalize_refs`]. Returns the payload and one warning per dropped
    /// reference.
    #[must_use]
    pub fn for_new_task(
        locator: &Locator,
        context_id: ContextId,
        mut fields: Map<String, Value>,
    ) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let mut data = Self::new(locator, context_id);

        for (key, slot) in [("dep", &mut data.dep), ("next_task", &mut data.next_task)] {
            if let Some(value) = fields.remove(key) {
                let (refs, rejected) = normalize_refs(&value);
                for bad in rejected {
                    warnings.push(format!("Removing invalid {key} reference {bad}."));
                }
                *slot = refs;
            }
        }
        if let Some(value) = fields.remove("milestone") {
            match value.as_u64() {
                Some(m) => data.milestone = Some(m),
                None => warnings.push(format!("Ignoring non-numeric milestone {value}.")),
            }
        }
        for key in RESERVED_KEYS {
            fields.remove(*key);
        }
        data.extra = fields;
        (data, warnings)
    }

    /// Callable locator stored in the payload.
    #[must_use]
    pub fn locator(&self) -> Locator {
        Locator {
            module: self.module.clone(),
            method: self.method.clone(),
        }
    }

    /// Progress percentage, `None` while `max_records` is unknown.
    #[must_use]
    pub fn progress_percent(&self) -> Option<f64> {
        if self.max_records == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let pct = 100.0 * self.records_processed as f64 / self.max_records as f64;
        Some((pct * 100.0).round() / 100.0)
    }

    /// Zero the counters and clear the milestone and completion flag.
    pub fn reset_progress(&mut self) {
        self.records_processed = 0;
        self.max_records = 0;
        self.milestone = None;
        self.milestone_fired = None;
        self.task_done = false;
    }
}

/// Normalize a `dep`/`next_task` value into task ids.
///
/// Numbers and numeric strings pass through, objects carrying a numeric
/// `id` (a serialized task reference) are replaced by that id. Anything
/// else is dropped and returned in the second element.
#[must_use]
pub fn normalize_refs(value: &Value) -> (Option<TaskRefs>, Vec<Value>) {
    match value {
        Value::Array(items) => {
            let mut ids = Vec::with_capacity(items.len());
            let mut rejected = Vec::new();
            for item in items {
                match ref_id(item) {
                    Some(id) if !ids.contains(&id) => ids.push(id),
                    Some(_) => {}
                    None => rejected.push(item.clone()),
                }
            }
            let refs = if ids.is_empty() {
                None
            } else {
                Some(TaskRefs::Many(ids))
            };
            (refs, rejected)
        }
        Value::Null => (None, Vec::new()),
        other => match ref_id(other) {
            Some(id) => (Some(TaskRefs::One(id)), Vec::new()),
            None => (None, vec![other.clone()]),
        },
    }
}

fn ref_id(value: &Value) -> Option<TaskId> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(obj) => obj.get("id").and_then(Value::as_u64),
        _ => None,
    }
}

/// Encode a payload to its stored textual form.
pub fn encode(data: &TaskData) -> Result<String, TaskerError> {
    Ok(serde_json::to_string(data)?)
}

/// Decode a stored payload.
pub fn decode(encoded: &str) -> Result<TaskData, TaskerError> {
    Ok(serde_json::from_str(encoded)?)
}

/// Content hash of an encoded payload, as lowercase hex.
#[must_use]
pub fn signature(encoded: &str) -> String {
    let digest = Sha256::digest(encoded.as_bytes());
    format!("{digest:x}")
}

/// `task_done` is persisted as 0/1; booleans and numeric strings are
/// accepted on the way in.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Int(i64),
            Float(f64),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => b,
            Raw::Int(i) => i != 0,
            Raw::Float(f) => f != 0.0,
            Raw::Text(s) => !matches!(s.trim(), "" | "0" | "false"),
        })
    }
}
