//! Core task model, engine, and execution protocol.

pub mod data;
pub mod error;
pub mod executor;
pub mod guard;
pub mod interrupt;
pub mod notice;
pub mod registry;
pub mod store;
pub mod task;
pub mod tasker;

pub use data::{TaskData, TaskRefs};
pub use error::{AppResult, TaskerError};
pub use executor::{Increment, IncrementOutcome, SaveOptions};
pub use guard::{ExecutionGuard, Refusal, RunParams};
pub use interrupt::Interrupts;
pub use notice::{Notice, NoticeLevel, Notices};
pub use registry::{
    CallableRegistry, ContextRef, ContextSource, InMemoryContextSource, Locator, TaskCallable,
};
pub use store::{TaskSelector, TaskStore};
pub use task::{ContextId, Task, TaskField, TaskId, TaskState};
pub use tasker::{NewTask, Tasker};
