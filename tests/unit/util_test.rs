//! Tests for utility helpers

use prometheus_tasker::util::clock::now_ms;
use prometheus_tasker::util::memory::{
    safe_memory_limit, MemoryProbe, ProcessMemoryProbe, StaticMemoryProbe, MEMORY_HEADROOM_BYTES,
};
use prometheus_tasker::util::telemetry::init_tracing;

#[test]
fn test_now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(b >= a);
    assert!(a > 1_600_000_000_000);
}

#[test]
fn test_safe_memory_limit_subtracts_headroom() {
    assert_eq!(safe_memory_limit(None), None);
    assert_eq!(safe_memory_limit(Some(MEMORY_HEADROOM_BYTES * 3)), Some(MEMORY_HEADROOM_BYTES * 2));
    assert_eq!(safe_memory_limit(Some(1)), Some(0));
}

#[test]
fn test_static_probe_reports_set_value() {
    let probe = StaticMemoryProbe::new(10);
    assert_eq!(probe.usage_bytes(), 10);
    probe.set(20);
    assert_eq!(probe.usage_bytes(), 20);
}

#[cfg(target_os = "linux")]
#[test]
fn test_process_probe_reads_rss() {
    assert!(ProcessMemoryProbe.usage_bytes() > 0);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
