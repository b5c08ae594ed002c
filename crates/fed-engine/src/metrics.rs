// SPDX-License-Identifier: MIT OR Apache-2.0
//! Atomic task counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters tracking scheduler activity.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    expired: AtomicU64,
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Tasks handed to an actor.
    pub dispatched: u64,
    /// Tasks whose result was stored successfully.
    pub completed: u64,
    /// Tasks that failed inside the executor.
    pub failed: u64,
    /// Tasks cancelled on TTL expiry.
    pub expired: u64,
}

impl EngineMetrics {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a task dispatched to an actor.
    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a task completed successfully.
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a task failed by its executor.
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a task cancelled on TTL expiry.
    pub fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = EngineMetrics::new();
        metrics.record_dispatched();
        metrics.record_dispatched();
        metrics.record_completed();
        metrics.record_failed();

        let snap = metrics.snapshot();
        assert_eq!(snap.dispatched, 2);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.expired, 0);
    }
}
