//! Admission checks run before (and during) every increment.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::task::Task;
use crate::util::memory::MemoryProbe;

/// Runtime parameters of one increment.
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Who asked for the increment (`periodic`, `cron`, a user name...).
    pub invoker: String,
    /// Wall-clock deadline; `None` runs until the callable yields.
    pub deadline: Option<Instant>,
    /// Memory ceiling in bytes.
    pub memory_limit: Option<u64>,
}

impl RunParams {
    /// Parameters without deadline or memory ceiling.
    pub fn new(invoker: impl Into<String>) -> Self {
        Self {
            invoker: invoker.into(),
            deadline: None,
            memory_limit: None,
        }
    }

    /// Set the deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Set an absolute deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the memory ceiling.
    #[must_use]
    pub const fn with_memory_limit(mut self, bytes: Option<u64>) -> Self {
        self.memory_limit = bytes;
        self
    }
}

/// Why the guard refused an increment. Refusal means "yield", not failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// The task is not in the `Active` state.
    NotActive,
    /// Less than the safety margin is left before the deadline.
    TimeLimit,
    /// Memory usage reached the configured fraction of the ceiling.
    MemoryLimit,
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotActive => "it is not active",
            Self::TimeLimit => "time limits",
            Self::MemoryLimit => "memory limits",
        })
    }
}

/// Time and memory budget checks.
#[derive(Clone)]
pub struct ExecutionGuard {
    safety_margin: Duration,
    memory_threshold: f64,
    probe: Arc<dyn MemoryProbe>,
}

impl ExecutionGuard {
    /// Create a guard.
    pub fn new(safety_margin: Duration, memory_threshold: f64, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            safety_margin,
            memory_threshold,
            probe,
        }
    }

    /// Check, in order: active state, deadline slack, memory usage.
    pub fn check(&self, task: &Task, params: &RunParams) -> Result<(), Refusal> {
        if !task.is_active() {
            return Err(Refusal::NotActive);
        }
        if let Some(deadline) = params.deadline {
            if Instant::now() + self.safety_margin > deadline {
                return Err(Refusal::TimeLimit);
            }
        }
        if let Some(limit) = params.memory_limit {
            #[allow(clippy::cast_precision_loss)]
            let used = self.probe.usage_bytes() as f64;
            #[allow(clippy::cast_precision_loss)]
            let ceiling = limit as f64 * self.memory_threshold;
            if used >= ceiling {
                return Err(Refusal::MemoryLimit);
            }
        }
        Ok(())
    }

    /// Margin kept free before the deadline.
    #[must_use]
    pub const fn safety_margin(&self) -> Duration {
        self.safety_margin
    }
}

impl fmt::Debug for ExecutionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionGuard")
            .field("safety_margin", &self.safety_margin)
            .field("memory_threshold", &self.memory_threshold)
            .finish_non_exhaustive()
    }
}
