//! Tests for runtime adapters and API models

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prometheus_tasker::config::TaskerConfig;
use prometheus_tasker::core::{
    CallableRegistry, ContextRef, InMemoryContextSource, Increment, Locator, NewTask, TaskCallable,
    TaskData, TaskState, Tasker,
};
use prometheus_tasker::infra::InMemoryTaskStore;
use prometheus_tasker::runtime::{health, list_tasks, PeriodicTrigger, Spawn, TokioSpawner};

struct CountCalls(Arc<AtomicUsize>);

#[async_trait]
impl TaskCallable for CountCalls {
    async fn run(
        &self,
        _context: &ContextRef,
        data: &mut TaskData,
        _increment: &mut Increment<'_>,
    ) -> anyhow::Result<bool> {
        self.0.fetch_add(1, Ordering::SeqCst);
        data.records_processed += 1;
        data.max_records = 2;
        data.task_done = data.records_processed == 2;
        Ok(true)
    }
}

fn tasker_with(calls: Arc<AtomicUsize>) -> (Tasker, Locator) {
    let registry = Arc::new(CallableRegistry::new());
    let locator = Locator::new(Some("Report"), "render");
    registry
        .register(locator.clone(), Arc::new(CountCalls(calls)))
        .unwrap();
    let contexts = Arc::new(InMemoryContextSource::new());
    contexts.insert(1, "Dashboard");
    let tasker = Tasker::new(
        TaskerConfig {
            periodic_interval_secs: 2,
            periodic_timeout_secs: 1,
            safety_margin_ms: 0,
            ..TaskerConfig::default()
        },
        Arc::new(InMemoryTaskStore::new()),
        registry,
        contexts,
    );
    (tasker, locator)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_trigger_runs_until_shutdown() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (tasker, locator) = tasker_with(calls.clone());
    let mut task = tasker.create_task(NewTask::new(locator, 1, "Render")).unwrap();
    tasker.activate_task(&mut task).unwrap();
    let tasker = Arc::new(tasker);

    let trigger = PeriodicTrigger::start(tasker.clone(), &TokioSpawner::current());
    tokio::time::sleep(Duration::from_secs(5)).await;
    trigger.shutdown();
    assert!(trigger.is_shut_down());

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(tasker.get_task_by_id(task.id).unwrap().state, TaskState::Finished);
}

#[tokio::test]
async fn test_cron_trigger_is_gated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (tasker, locator) = tasker_with(calls.clone());
    let mut task = tasker.create_task(NewTask::new(locator, 1, "Render")).unwrap();
    tasker.activate_task(&mut task).unwrap();

    let report = tasker.execute_by_cron().await;
    assert!(report.executed.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_list_tasks_and_health() {
    let (tasker, locator) = tasker_with(Arc::new(AtomicUsize::new(0)));
    let mut task = tasker.create_task(NewTask::new(locator.clone(), 1, "Render")).unwrap();
    tasker.create_task(NewTask::new(locator, 1, "Render again")).unwrap();
    tasker.activate_task(&mut task).unwrap();

    let summaries = list_tasks(&tasker, "").unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].title, "Render");
    assert_eq!(summaries[0].state, TaskState::Active);
    assert_eq!(summaries[0].log_summary, "No error(s)");

    let active = list_tasks(&tasker, "state=active").unwrap();
    assert_eq!(active.len(), 1);
    assert!(list_tasks(&tasker, "bogus").is_err());

    let status = health(&tasker);
    assert!(status.ok);
    assert_eq!(status.runnable, 1);
}
