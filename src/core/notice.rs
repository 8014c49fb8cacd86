//! Notice buffers.
//!
//! Notices are the human-facing messages an engine run produces. Each one
//! is mirrored to `tracing` and kept in a bounded journal that a trigger
//! drains and hands back to its caller. Notices raised inside an increment
//! are also written to that task's log at the next checkpoint; the
//! increment keeps those itself.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

use crate::util::clock::now_ms;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoticeLevel {
    /// Only kept when debug notices are enabled.
    Debug,
    /// Informational.
    Message,
    /// Something the administrator should look at.
    Warning,
    /// A failure.
    Error,
}

/// A single notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Message text.
    pub text: String,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

impl Notice {
    /// Build a notice stamped with the current time.
    pub fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            created_at_ms: now_ms(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            NoticeLevel::Error => write!(f, "ERROR: {}", self.text),
            NoticeLevel::Warning => write!(f, "WARNING: {}", self.text),
            NoticeLevel::Debug | NoticeLevel::Message => f.write_str(&self.text),
        }
    }
}

/// Bounded, thread-safe notice journal.
pub struct Notices {
    journal: Mutex<VecDeque<Notice>>,
    max_notices: usize,
    debug: bool,
}

impl Notices {
    /// Create a journal holding at most `max_notices`.
    #[must_use]
    pub fn new(max_notices: usize, debug: bool) -> Self {
        Self {
            journal: Mutex::new(VecDeque::new()),
            max_notices: max_notices.max(1),
            debug,
        }
    }

    /// Record a notice.
    pub fn push(&self, level: NoticeLevel, text: impl Into<String>) {
        self.record(&Notice::new(level, text));
    }

    /// Mirror `notice` to tracing and journal it. Returns false for a debug
    /// notice while debug mode is off; such a notice is not kept anywhere.
    pub fn record(&self, notice: &Notice) -> bool {
        match notice.level {
            NoticeLevel::Debug => tracing::debug!("{}", notice.text),
            NoticeLevel::Message => tracing::info!("{}", notice.text),
            NoticeLevel::Warning => tracing::warn!("{}", notice.text),
            NoticeLevel::Error => tracing::error!("{}", notice.text),
        }
        if notice.level == NoticeLevel::Debug && !self.debug {
            return false;
        }
        let mut journal = self.journal.lock();
        if journal.len() >= self.max_notices {
            journal.pop_front();
        }
        journal.push_back(notice.clone());
        true
    }

    /// Record a debug notice.
    pub fn debug(&self, text: impl Into<String>) {
        self.push(NoticeLevel::Debug, text);
    }

    /// Record an informational notice.
    pub fn message(&self, text: impl Into<String>) {
        self.push(NoticeLevel::Message, text);
    }

    /// Record a warning.
    pub fn warning(&self, text: impl Into<String>) {
        self.push(NoticeLevel::Warning, text);
    }

    /// Record an error.
    pub fn error(&self, text: impl Into<String>) {
        self.push(NoticeLevel::Error, text);
    }

    /// Take everything recorded since the last drain.
    pub fn drain_journal(&self) -> Vec<Notice> {
        self.journal.lock().drain(..).collect()
    }

    /// Snapshot of the journal without draining it.
    pub fn journal(&self) -> Vec<Notice> {
        self.journal.lock().iter().cloned().collect()
    }

    /// Whether debug notices are kept.
    #[must_use]
    pub const fn debug_enabled(&self) -> bool {
        self.debug
    }
}

impl fmt::Debug for Notices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notices")
            .field("max_notices", &self.max_notices)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Render notices as task log lines.
#[must_use]
pub fn render_log_lines(notices: &[Notice]) -> String {
    let mut out = String::new();
    for notice in notices {
        out.push_str(&notice.to_string());
        out.push('\n');
    }
    out
}

/// Count `ERROR:`/`WARNING:` markers in a task log and summarize them.
///
/// Errors are always reported when requested (`"No error(s)"` when there
/// are none); warnings only when present.
#[must_use]
pub fn log_summary(log: &str, errors: bool, warnings: bool) -> String {
    let mut summary = String::new();
    if errors {
        match log.matches("ERROR:").count() {
            0 => summary.push_str("No error(s)"),
            n => summary.push_str(&format!("{n} error(s)")),
        }
    }
    if warnings {
        let n = log.matches("WARNING:").count();
        if n > 0 {
            if !summary.is_empty() {
                summary.push_str(" and ");
            }
            summary.push_str(&format!("{n} warning(s)"));
        }
    }
    summary
}
