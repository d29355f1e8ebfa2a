//! Lossy, process-wide accounting of write activity.
//!
//! No locks: a process-wide atomic counter set is used purely for
//! statistics, and dropped updates under contention are tolerated.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct WriteStats {
    api_calls: AtomicU64,
    bytes_written: AtomicU64,
    partial_events: AtomicU64,
    partial_bytes: AtomicU64,
}

impl WriteStats {
    pub const fn new() -> Self {
        Self {
            api_calls: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            partial_events: AtomicU64::new(0),
            partial_bytes: AtomicU64::new(0),
        }
    }

    pub fn bump_api_call(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_bytes_written(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bump_partial(&self, residue_len: u64) {
        self.partial_events.fetch_add(1, Ordering::Relaxed);
        self.partial_bytes.fetch_add(residue_len, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WriteStatsSnapshot {
        WriteStatsSnapshot {
            api_calls: self.api_calls.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            partial_events: self.partial_events.load(Ordering::Relaxed),
            partial_bytes: self.partial_bytes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteStatsSnapshot {
    pub api_calls: u64,
    pub bytes_written: u64,
    pub partial_events: u64,
    pub partial_bytes: u64,
}
