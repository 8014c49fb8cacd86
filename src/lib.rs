//! # Prometheus Tasker
//!
//! A cooperative, resumable task scheduler for long-running host operations.
//!
//! Imports, batch jobs and similar work run in small, time-boxed increments
//! spread over many invocations: a periodic in-process tick, an external cron
//! process, or an on-demand call. Progress, state and input parameters are
//! persisted between increments so a task survives process restarts and
//! resumes where it left off.
//!
//! ## Core Problem Solved
//!
//! - **Bounded invocations**: each trigger has a wall-clock and memory
//!   budget; work must yield before it runs out.
//! - **Multiple schedulers**: a periodic tick and a cron process may race for
//!   the same task; the persisted `running` flag keeps one increment in
//!   flight per task.
//! - **Chained work**: tasks wait for dependencies and activate follow-ups.
//!
//! ## Key Features
//!
//! - **State machine**: `Waiting → Active → Finished | Failed | Killed`, driven
//!   by the executor and by administrative actions.
//! - **Execution guard**: active-state, deadline and memory checks before and
//!   during every increment.
//! - **Checkpoints**: callables save progress through [`core::Increment`],
//!   which also delivers stop requests.
//! - **Fault containment**: errors, panics and deadline expiry become state
//!   transitions and notices, never trigger failures.
//! - **Pluggable storage**: in-memory and JSON-lines file stores behind
//!   [`core::TaskStore`].
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_tasker::builders::build_tasker;
//! use prometheus_tasker::config::TaskerConfig;
//! use prometheus_tasker::core::{CallableRegistry, InMemoryContextSource, Locator, NewTask};
//!
//! let registry = Arc::new(CallableRegistry::new());
//! registry.register(Locator::new(Some("Importer"), "import_rows"), Arc::new(ImportRows))?;
//! let contexts = Arc::new(InMemoryContextSource::new());
//! contexts.insert(42, "Product catalog");
//!
//! let tasker = build_tasker(TaskerConfig::from_env()?, registry, contexts)?;
//! let mut task = tasker.create_task(NewTask::new(
//!     Locator::new(Some("Importer"), "import_rows"),
//!     42,
//!     "Import catalog",
//! ))?;
//! tasker.activate_task(&mut task)?;
//!
//! let report = tasker.execute_periodic().await;
//! print!("{}", report.render_text());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct the engine from configuration.
pub mod builders;
/// Engine configuration.
pub mod config;
/// Core task model, engine, and execution protocol.
pub mod core;
/// Task store backends.
pub mod infra;
/// Trigger entry points, runtime adapters, and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
