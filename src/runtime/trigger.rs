//! Trigger entry points.
//!
//! Each entry point selects active, idle tasks in store order and runs them
//! one increment at a time until one actually executes. Refused candidates
//! are excluded and the next one is tried. Notices collected along the way
//! are returned in a [`TriggerReport`].

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::{
    IncrementOutcome, Notice, NoticeLevel, Refusal, RunParams, Task, TaskId, TaskSelector, Tasker,
};
use crate::runtime::tokio_spawner::Spawn;

/// Invoker name of the periodic trigger.
pub const PERIODIC_INVOKER: &str = "periodic";
/// Invoker name of the external-process trigger.
pub const CRON_INVOKER: &str = "cron";

/// Result of one trigger invocation.
#[derive(Debug, Clone, Default)]
pub struct TriggerReport {
    /// Task whose callable ran, if any.
    pub executed: Option<TaskId>,
    /// Outcome of that increment.
    pub outcome: Option<IncrementOutcome>,
    /// Candidates tried and skipped, in order.
    pub skipped: Vec<TaskId>,
    /// Notices recorded during the invocation.
    pub notices: Vec<Notice>,
}

impl TriggerReport {
    /// Plain-text rendering, one notice per line.
    #[must_use]
    pub fn render_text(&self) -> String {
        self.notices
            .iter()
            .map(|n| format!("{n}\n"))
            .collect()
    }

    /// HTML rendering for web hosts. Empty when there is nothing to show.
    #[must_use]
    pub fn render_html(&self) -> String {
        if self.notices.is_empty() {
            return String::new();
        }
        let mut html = String::from("<ul class=\"NoticeMessages\">");
        for notice in &self.notices {
            let class = match notice.level {
                NoticeLevel::Error => "error",
                NoticeLevel::Warning => "warning",
                NoticeLevel::Message => "message",
                NoticeLevel::Debug => "debug",
            };
            html.push_str(&format!(
                "<li class=\"{class}\">{}</li>",
                escape_html(&notice.to_string())
            ));
        }
        html.push_str("</ul>");
        html
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

impl Tasker {
    /// Periodic tick: runs with a deadline of `periodic_timeout_secs` from
    /// now and the safe memory limit. Does nothing when disabled.
    pub async fn execute_periodic(&self) -> TriggerReport {
        if !self.config().enable_periodic {
            return TriggerReport::default();
        }
        let params = RunParams::new(PERIODIC_INVOKER)
            .with_timeout(self.config().periodic_timeout())
            .with_memory_limit(self.config().safe_memory_limit());
        self.run_trigger(params).await
    }

    /// External-process tick: no deadline, safe memory limit. Does nothing
    /// unless `enable_cron` is set.
    pub async fn execute_by_cron(&self) -> TriggerReport {
        if !self.config().enable_cron {
            return TriggerReport::default();
        }
        let params =
            RunParams::new(CRON_INVOKER).with_memory_limit(self.config().safe_memory_limit());
        self.run_trigger(params).await
    }

    /// On-demand run of one task, as requested by `invoker`, with the HTTP
    /// deadline and the safe memory limit.
    pub async fn execute_task(&self, task: &Task, invoker: &str) -> IncrementOutcome {
        let params = RunParams::new(invoker)
            .with_timeout(self.config().http_timeout())
            .with_memory_limit(self.config().safe_memory_limit());
        self.execute_task_with(task, params).await
    }

    /// On-demand run with explicit parameters.
    pub async fn execute_task_with(&self, task: &Task, params: RunParams) -> IncrementOutcome {
        if task.running {
            self.notices().warning(format!(
                "Task '{}' is already running. Will not execute again.",
                task.title
            ));
            return IncrementOutcome::AlreadyRunning;
        }
        self.execute_task_now(task.clone(), params).await
    }

    async fn run_trigger(&self, params: RunParams) -> TriggerReport {
        let mut report = TriggerReport::default();
        let mut selector = TaskSelector::runnable();
        loop {
            let candidate = match self.store.find_one(&selector) {
                Ok(Some(task)) => task,
                Ok(None) => break,
                Err(e) => {
                    self.notices()
                        .error(format!("Could not select a task to execute: {e}"));
                    break;
                }
            };
            self.notices().debug(format!(
                "{} invoking Tasker to execute '{}'.",
                params.invoker, candidate.title
            ));
            let id = candidate.id;
            let outcome = self.execute_task_now(candidate, params.clone()).await;
            if outcome.executed() {
                report.executed = Some(id);
                report.outcome = Some(outcome);
                break;
            }
            report.skipped.push(id);
            // Budget refusals hold for every remaining candidate.
            if matches!(
                outcome,
                IncrementOutcome::Refused(Refusal::TimeLimit | Refusal::MemoryLimit)
            ) {
                break;
            }
            self.notices().debug(format!(
                "Could not execute task {id}. Trying to find another candidate."
            ));
            selector = selector.exclude(id);
        }
        report.notices = self.drain_notices();
        report
    }
}

/// Background loop calling [`Tasker::execute_periodic`] at the configured
/// cadence until shut down.
#[derive(Debug)]
pub struct PeriodicTrigger {
    shutdown: CancellationToken,
}

impl PeriodicTrigger {
    /// Spawn the loop. The first tick fires immediately.
    pub fn start<S: Spawn>(tasker: Arc<Tasker>, spawner: &S) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let every = tasker.config().periodic_interval();
        spawner.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!("periodic trigger started, every {:?}", every);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = tasker.execute_periodic().await;
                        if let Some(id) = report.executed {
                            tracing::debug!(task_id = id, outcome = ?report.outcome, "periodic tick executed a task");
                        }
                    }
                }
            }
            tracing::info!("periodic trigger stopped");
        });
        Self { shutdown }
    }

    /// Stop the loop after the current tick.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether [`Self::shutdown`] was called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
