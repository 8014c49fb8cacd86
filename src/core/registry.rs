//! Callable registry and context resolution.
//!
//! Tasks name the work they run with a [`Locator`]. Hosts register a
//! [`TaskCallable`] under that locator before creating tasks for it; the
//! registry is the only way the engine reaches user code.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::data::TaskData;
use crate::core::executor::Increment;
use crate::core::task::ContextId;
use crate::core::TaskerError;

/// Stable key of a registered callable: an optional module plus a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    /// Owning module, `None` for free functions.
    pub module: Option<String>,
    /// Method or function name.
    pub method: String,
}

impl Locator {
    /// Build a locator.
    pub fn new(module: Option<&str>, method: impl Into<String>) -> Self {
        Self {
            module: module.map(str::to_owned),
            method: method.into(),
        }
    }

    fn validate(&self) -> Result<(), TaskerError> {
        let valid = |s: &str| {
            !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
        };
        if !valid(&self.method) {
            return Err(TaskerError::InvalidArgument(format!(
                "invalid method name '{}'",
                self.method
            )));
        }
        if let Some(module) = &self.module {
            if !valid(module) {
                return Err(TaskerError::InvalidArgument(format!(
                    "invalid module name '{module}'"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{module}->{}", self.method),
            None => f.write_str(&self.method),
        }
    }
}

/// The external object a task operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRef {
    /// Object identifier.
    pub id: ContextId,
    /// Label used in notices.
    pub title: String,
}

/// Resolves context ids to live objects.
pub trait ContextSource: Send + Sync {
    /// Look up an object; `None` if it does not exist.
    fn resolve(&self, id: ContextId) -> Option<ContextRef>;
}

/// Context source backed by a map, for hosts without their own object store.
#[derive(Debug, Default)]
pub struct InMemoryContextSource {
    objects: RwLock<HashMap<ContextId, ContextRef>>,
}

impl InMemoryContextSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an object.
    pub fn insert(&self, id: ContextId, title: impl Into<String>) -> ContextRef {
        let object = ContextRef {
            id,
            title: title.into(),
        };
        self.objects.write().insert(id, object.clone());
        object
    }

    /// Remove an object.
    pub fn remove(&self, id: ContextId) -> Option<ContextRef> {
        self.objects.write().remove(&id)
    }
}

impl ContextSource for InMemoryContextSource {
    fn resolve(&self, id: ContextId) -> Option<ContextRef> {
        self.objects.read().get(&id).cloned()
    }
}

/// A unit of resumable work.
///
/// The callable receives the context object, the task's decoded data and the
/// running [`Increment`]. It must:
///
/// - continue from `data.records_processed` rather than restart,
/// - call [`Increment::allowed_to_execute`] between records and return early
///   (with `Ok(true)`) once it says no,
/// - checkpoint with [`Increment::save_progress`] or
///   [`Increment::save_progress_at_milestone`],
/// - set `data.task_done = true` once everything is done.
///
/// `Ok(false)` and `Err(_)` both fail the task.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_tasker::core::{ContextRef, Increment, TaskCallable, TaskData};
///
/// struct CountTo(u64);
///
/// #[async_trait]
/// impl TaskCallable for CountTo {
///     async fn run(
///         &self,
///         _context: &ContextRef,
///         data: &mut TaskData,
///         increment: &mut Increment<'_>,
///     ) -> anyhow::Result<bool> {
///         data.max_records = self.0;
///         while data.records_processed < self.0 {
///             if !increment.allowed_to_execute() {
///                 return Ok(true);
///             }
///             data.records_processed += 1;
///             increment.save_progress_at_milestone(data)?;
///         }
///         data.task_done = true;
///         Ok(true)
///     }
/// }
/// ```
#[async_trait]
pub trait TaskCallable: Send + Sync {
    /// Run one increment of work.
    async fn run(
        &self,
        context: &ContextRef,
        data: &mut TaskData,
        increment: &mut Increment<'_>,
    ) -> anyhow::Result<bool>;
}

struct Entry {
    callable: Arc<dyn TaskCallable>,
    enabled: bool,
}

/// Typed mapping from locators to callables.
#[derive(Default)]
pub struct CallableRegistry {
    entries: RwLock<HashMap<Locator, Entry>>,
}

impl CallableRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a callable. The locator is validated here so
    /// that resolution later never sees a malformed key.
    pub fn register(
        &self,
        locator: Locator,
        callable: Arc<dyn TaskCallable>,
    ) -> Result<(), TaskerError> {
        locator.validate()?;
        tracing::debug!("registered callable {}", locator);
        self.entries.write().insert(
            locator,
            Entry {
                callable,
                enabled: true,
            },
        );
        Ok(())
    }

    /// Enable or disable a registered callable. Returns false if unknown.
    pub fn set_enabled(&self, locator: &Locator, enabled: bool) -> bool {
        match self.entries.write().get_mut(locator) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Resolve an enabled callable.
    #[must_use]
    pub fn resolve(&self, locator: &Locator) -> Option<Arc<dyn TaskCallable>> {
        self.entries
            .read()
            .get(locator)
            .filter(|e| e.enabled)
            .map(|e| Arc::clone(&e.callable))
    }

    /// Whether `locator` resolves to an enabled callable.
    #[must_use]
    pub fn contains(&self, locator: &Locator) -> bool {
        self.resolve(locator).is_some()
    }
}

impl fmt::Debug for CallableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("CallableRegistry")
            .field("callables", &entries.keys().map(ToString::to_string).collect::<Vec<_>>())
            .finish()
    }
}
