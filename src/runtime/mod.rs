//! Trigger entry points, runtime adapters, and API surface.

pub mod api;
#[cfg(feature = "signals")]
pub mod signals;
pub mod tokio_spawner;
pub mod trigger;

pub use api::{health, list_tasks, Health, TaskSummary};
#[cfg(feature = "signals")]
pub use signals::spawn_stop_on_signal;
pub use tokio_spawner::{Spawn, TokioSpawner};
pub use trigger::{PeriodicTrigger, TriggerReport, CRON_INVOKER, PERIODIC_INVOKER};
