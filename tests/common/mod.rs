//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use prometheus_tasker::config::TaskerConfig;
use prometheus_tasker::core::{
    CallableRegistry, ContextRef, InMemoryContextSource, Increment, Locator, NewTask, Task,
    TaskCallable, TaskData, TaskField, TaskId, TaskState, TaskStore, Tasker,
};
use prometheus_tasker::infra::InMemoryTaskStore;
use prometheus_tasker::util::memory::StaticMemoryProbe;

/// Context object every fixture task runs against.
pub const CATALOG: u64 = 42;

/// Engine wired to in-memory collaborators the test can reach into.
pub struct Harness {
    pub tasker: Tasker,
    pub store: Arc<InMemoryTaskStore>,
    pub registry: Arc<CallableRegistry>,
    pub contexts: Arc<InMemoryContextSource>,
    pub probe: Arc<StaticMemoryProbe>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(TaskerConfig {
            debug: true,
            ..TaskerConfig::default()
        })
    }

    pub fn with_config(config: TaskerConfig) -> Self {
        let store = Arc::new(InMemoryTaskStore::new());
        let registry = Arc::new(CallableRegistry::new());
        let contexts = Arc::new(InMemoryContextSource::new());
        contexts.insert(CATALOG, "Product catalog");
        let probe = Arc::new(StaticMemoryProbe::new(0));
        let tasker = Tasker::new(config, store.clone(), registry.clone(), contexts.clone())
            .with_memory_probe(probe.clone());
        Self {
            tasker,
            store,
            registry,
            contexts,
            probe,
        }
    }

    pub fn register(&self, method: &str, callable: impl TaskCallable + 'static) -> Locator {
        let locator = Locator::new(Some("Importer"), method);
        self.registry
            .register(locator.clone(), Arc::new(callable))
            .unwrap();
        locator
    }

    pub fn create(&self, locator: &Locator, title: &str) -> Task {
        self.tasker
            .create_task(NewTask::new(locator.clone(), CATALOG, title))
            .unwrap()
    }

    pub fn create_active(&self, locator: &Locator, title: &str) -> Task {
        let mut task = self.create(locator, title);
        assert!(self.tasker.activate_task(&mut task).unwrap());
        task
    }

    pub fn reload(&self, id: TaskId) -> Task {
        self.store.get(id).unwrap().unwrap()
    }

    pub fn set_state(&self, id: TaskId, state: TaskState) {
        let mut task = self.reload(id);
        task.state = state;
        self.store.save(&task, Some(&[TaskField::State])).unwrap();
    }

    pub fn data(&self, id: TaskId) -> TaskData {
        self.reload(id).decode_data().unwrap()
    }
}

/// Counts through `total` records, at most `per_increment` per call, and
/// records what it observed along the way.
#[derive(Clone, Default)]
pub struct Counter {
    pub total: u64,
    pub per_increment: Option<u64>,
    pub milestone: Option<u64>,
    pub fired_at: Arc<Mutex<Vec<u64>>>,
    pub running_seen: Arc<Mutex<Vec<bool>>>,
    pub store: Option<Arc<InMemoryTaskStore>>,
    pub calls: Arc<AtomicUsize>,
}

impl Counter {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskCallable for Counter {
    async fn run(
        &self,
        _context: &ContextRef,
        data: &mut TaskData,
        increment: &mut Increment<'_>,
    ) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(store) = &self.store {
            let stored = store.get(increment.task().id)?.ok_or_else(|| anyhow!("gone"))?;
            self.running_seen.lock().push(stored.running);
        }
        data.max_records = self.total;
        if data.milestone.is_none() {
            data.milestone = self.milestone;
        }
        let mut this_call = 0;
        while data.records_processed < self.total {
            if self.per_increment == Some(this_call) || !increment.allowed_to_execute() {
                return Ok(true);
            }
            data.records_processed += 1;
            this_call += 1;
            if increment.save_progress_at_milestone(data)? {
                self.fired_at.lock().push(data.records_processed);
            }
        }
        data.task_done = true;
        Ok(true)
    }
}

/// Returns an error.
pub struct Failing;

#[async_trait]
impl TaskCallable for Failing {
    async fn run(
        &self,
        _context: &ContextRef,
        _data: &mut TaskData,
        increment: &mut Increment<'_>,
    ) -> anyhow::Result<bool> {
        increment.warning("about to fail");
        Err(anyhow!("source file is missing"))
    }
}

/// Reports failure without an error.
pub struct Declining;

#[async_trait]
impl TaskCallable for Declining {
    async fn run(
        &self,
        _context: &ContextRef,
        _data: &mut TaskData,
        _increment: &mut Increment<'_>,
    ) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Panics mid-increment.
pub struct Panicking;

#[async_trait]
impl TaskCallable for Panicking {
    async fn run(
        &self,
        _context: &ContextRef,
        data: &mut TaskData,
        _increment: &mut Increment<'_>,
    ) -> anyhow::Result<bool> {
        data.records_processed += 1;
        panic!("ran out of patience");
    }
}

/// Sleeps far past any deadline.
pub struct Sleeper;

#[async_trait]
impl TaskCallable for Sleeper {
    async fn run(
        &self,
        _context: &ContextRef,
        _data: &mut TaskData,
        _increment: &mut Increment<'_>,
    ) -> anyhow::Result<bool> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(true)
    }
}

/// Works until a stop is requested, then yields.
pub struct UntilStopped;

#[async_trait]
impl TaskCallable for UntilStopped {
    async fn run(
        &self,
        _context: &ContextRef,
        data: &mut TaskData,
        increment: &mut Increment<'_>,
    ) -> anyhow::Result<bool> {
        data.records_processed = 1;
        increment.save_progress(data)?;
        increment.stop_token().cancelled().await;
        if increment.allowed_to_execute() {
            return Err(anyhow!("stop request was not applied"));
        }
        Ok(true)
    }
}

/// Waits for a stop request, then claims the work is done anyway.
pub struct FinishesAfterStop;

#[async_trait]
impl TaskCallable for FinishesAfterStop {
    async fn run(
        &self,
        _context: &ContextRef,
        data: &mut TaskData,
        increment: &mut Increment<'_>,
    ) -> anyhow::Result<bool> {
        data.records_processed = 1;
        increment.save_progress(data)?;
        increment.stop_token().cancelled().await;
        data.task_done = true;
        Ok(true)
    }
}

/// Records a warning, then waits for the gate before finishing.
#[derive(Clone, Default)]
pub struct Parked {
    pub gate: Arc<Notify>,
}

#[async_trait]
impl TaskCallable for Parked {
    async fn run(
        &self,
        _context: &ContextRef,
        data: &mut TaskData,
        increment: &mut Increment<'_>,
    ) -> anyhow::Result<bool> {
        let title = increment.task().title.clone();
        increment.warning(format!("'{title}' is waiting at the gate"));
        self.gate.notified().await;
        data.task_done = true;
        Ok(true)
    }
}
