//! Transport counters.
//!
//! Steady-state failures (queue-full drops, snapshot overflows) never fail the
//! caller; they are absorbed into these monotonically increasing counters.

use std::sync::atomic::{ AtomicU64, Ordering };

#[derive(Debug, Default)]
pub struct RingMetrics {
    pushed: AtomicU64,
    popped: AtomicU64,
    dropped_newest: AtomicU64,
    dropped_oldest: AtomicU64,
    snapshot_overflows: AtomicU64,
    wfc_completed: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub pushed: u64,
    pub popped: u64,
    pub dropped_newest: u64,
    pub dropped_oldest: u64,
    pub snapshot_overflows: u64,
    pub wfc_completed: u64,
}

impl RingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_push(&self) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pop(&self) {
        self.popped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_newest(&self) {
        self.dropped_newest.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_oldest(&self) {
        self.dropped_oldest.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_overflow(&self) {
        self.snapshot_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wfc_completed(&self) {
        self.wfc_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_newest.load(Ordering::Relaxed) + self.dropped_oldest.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            dropped_newest: self.dropped_newest.load(Ordering::Relaxed),
            dropped_oldest: self.dropped_oldest.load(Ordering::Relaxed),
            snapshot_overflows: self.snapshot_overflows.load(Ordering::Relaxed),
            wfc_completed: self.wfc_completed.load(Ordering::Relaxed),
        }
    }
}
