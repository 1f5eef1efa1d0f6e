//! Run loop metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lock-free per-loop counters.
#[derive(Debug, Default)]
pub struct RunLoopMetrics {
    /// Total activation iterations.
    pub iterations: AtomicU64,
    /// Explicit wakeups received on the wake port.
    pub wakeups: AtomicU64,
    /// Custom (v0) source performs.
    pub sources0_fired: AtomicU64,
    /// Port-backed (v1) source messages handled.
    pub sources1_fired: AtomicU64,
    /// Timer callouts.
    pub timers_fired: AtomicU64,
    /// Observer callouts.
    pub observer_callouts: AtomicU64,
    /// Deferred blocks executed.
    pub blocks_run: AtomicU64,
    /// Total time spent asleep on the port set (microseconds).
    pub sleep_time_us: AtomicU64,
}

impl RunLoopMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wakeup(&self) {
        self.wakeups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source0_fired(&self) {
        self.sources0_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source1_fired(&self) {
        self.sources1_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timer_fired(&self) {
        self.timers_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_observer_callout(&self) {
        self.observer_callouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block_run(&self) {
        self.blocks_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sleep_time(&self, duration_us: u64) {
        self.sleep_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            iterations: self.iterations.load(Ordering::Relaxed),
            wakeups: self.wakeups.load(Ordering::Relaxed),
            sources0_fired: self.sources0_fired.load(Ordering::Relaxed),
            sources1_fired: self.sources1_fired.load(Ordering::Relaxed),
            timers_fired: self.timers_fired.load(Ordering::Relaxed),
            observer_callouts: self.observer_callouts.load(Ordering::Relaxed),
            blocks_run: self.blocks_run.load(Ordering::Relaxed),
            sleep_time_us: self.sleep_time_us.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the counters at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub iterations: u64,
    pub wakeups: u64,
    pub sources0_fired: u64,
    pub sources1_fired: u64,
    pub timers_fired: u64,
    pub observer_callouts: u64,
    pub blocks_run: u64,
    pub sleep_time_us: u64,
}

impl MetricsSnapshot {
    /// Average sleep per wakeup in milliseconds.
    pub fn avg_sleep_ms(&self) -> f64 {
        if self.wakeups == 0 {
            return 0.0;
        }
        (self.sleep_time_us as f64 / self.wakeups as f64) / 1000.0
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
