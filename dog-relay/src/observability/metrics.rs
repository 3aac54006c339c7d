use std::sync::atomic::{AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live counters for relay operations
#[derive(Debug, Default)]
pub struct LiveMetrics {
    jobs_enqueued: AtomicU64,
    jobs_recovered: AtomicU64,
    jobs_dispatched: AtomicU64,
    jobs_requeued: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    inline_retries: AtomicU64,
    jobs_deferred: AtomicU64,
    retries_succeeded: AtomicU64,
    retries_escalated: AtomicU64,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_enqueued(&self) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_recovered(&self) {
        self.jobs_recovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dispatched(&self) {
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_requeued(&self) {
        self.jobs_requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_inline_retries(&self) {
        self.inline_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deferred(&self) {
        self.jobs_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retries_succeeded(&self) {
        self.retries_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retries_escalated(&self) {
        self.retries_escalated.fetch_add(1, Ordering::Relaxed);
    }

    /// Collect current snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            jobs_recovered: self.jobs_recovered.load(Ordering::Relaxed),
            jobs_dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            jobs_requeued: self.jobs_requeued.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            inline_retries: self.inline_retries.load(Ordering::Relaxed),
            jobs_deferred: self.jobs_deferred.load(Ordering::Relaxed),
            retries_succeeded: self.retries_succeeded.load(Ordering::Relaxed),
            retries_escalated: self.retries_escalated.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of counters at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub jobs_enqueued: u64,
    pub jobs_recovered: u64,
    pub jobs_dispatched: u64,
    pub jobs_requeued: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub inline_retries: u64,
    pub jobs_deferred: u64,
    pub retries_succeeded: u64,
    pub retries_escalated: u64,
}

impl MetricsSnapshot {
    /// Completed jobs as a percentage of finished ones
    pub fn success_rate(&self) -> f64 {
        let finished = self.jobs_completed + self.jobs_failed;
        if finished == 0 {
            100.0
        } else {
            (self.jobs_completed as f64 / finished as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let metrics = LiveMetrics::new();
        assert_eq!(metrics.snapshot().success_rate(), 100.0);

        metrics.increment_completed();
        metrics.increment_completed();
        metrics.increment_completed();
        metrics.increment_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_completed, 3);
        assert_eq!(snapshot.success_rate(), 75.0);
    }
}
