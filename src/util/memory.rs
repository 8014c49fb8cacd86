//! Process memory probes consulted by the execution guard.

use std::sync::atomic::{AtomicU64, Ordering};

/// Headroom subtracted from the configured memory ceiling.
pub const MEMORY_HEADROOM_BYTES: u64 = 5 * 1024 * 1024;

/// Source of the current process memory usage.
pub trait MemoryProbe: Send + Sync {
    /// Current usage in bytes.
    fn usage_bytes(&self) -> u64;
}

/// Reads the resident set size of the current process.
///
/// On Linux this parses `VmRSS` from `/proc/self/status`; elsewhere it
/// reports 0, which never trips the memory check.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemoryProbe;

impl MemoryProbe for ProcessMemoryProbe {
    fn usage_bytes(&self) -> u64 {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| parse_vm_rss(&status))
            .unwrap_or(0)
    }
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line
        .trim_start_matches("VmRSS:")
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse()
        .ok()?;
    Some(kb * 1024)
}

/// Probe returning a value set by the host (or a test).
#[derive(Debug, Default)]
pub struct StaticMemoryProbe {
    usage: AtomicU64,
}

impl StaticMemoryProbe {
    /// Create a probe reporting `usage` bytes.
    #[must_use]
    pub const fn new(usage: u64) -> Self {
        Self {
            usage: AtomicU64::new(usage),
        }
    }

    /// Change the reported usage.
    pub fn set(&self, usage: u64) {
        self.usage.store(usage, Ordering::Release);
    }
}

impl MemoryProbe for StaticMemoryProbe {
    fn usage_bytes(&self) -> u64 {
        self.usage.load(Ordering::Acquire)
    }
}

/// Usable memory ceiling: the configured limit minus [`MEMORY_HEADROOM_BYTES`].
#[must_use]
pub const fn safe_memory_limit(configured: Option<u64>) -> Option<u64> {
    match configured {
        Some(limit) => Some(limit.saturating_sub(MEMORY_HEADROOM_BYTES)),
        None => None,
    }
}
