//! Process-wide task metrics
//!
//! Lock-free counters for run outcomes, subtask progress and token spend,
//! exposed as a serializable snapshot on `GET /metrics`.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector
pub struct MetricsCollector {
    started_at: u64,
    tasks_started: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    subtasks_completed: AtomicU64,
    events_dropped: AtomicU64,
    tokens_used: AtomicU64,
    unauthorized_requests: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub tasks_started: u64,
    pub tasks_running: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub subtasks_completed: u64,
    pub events_dropped: u64,
    pub tokens_used: u64,
    pub unauthorized_requests: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started_at: unix_now(),
            tasks_started: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            subtasks_completed: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            tokens_used: AtomicU64::new(0),
            unauthorized_requests: AtomicU64::new(0),
        }
    }

    pub fn record_task_started(&self) {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_completed(&self, tokens: u64) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subtask_completed(&self) {
        self.subtasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unauthorized(&self) {
        self.unauthorized_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        unix_now().saturating_sub(self.started_at)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let started = self.tasks_started.load(Ordering::Relaxed);
        let completed = self.tasks_completed.load(Ordering::Relaxed);
        let failed = self.tasks_failed.load(Ordering::Relaxed);

        MetricsSnapshot {
            uptime_seconds: self.uptime_seconds(),
            tasks_started: started,
            tasks_running: started.saturating_sub(completed + failed),
            tasks_completed: completed,
            tasks_failed: failed,
            subtasks_completed: self.subtasks_completed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            tokens_used: self.tokens_used.load(Ordering::Relaxed),
            unauthorized_requests: self.unauthorized_requests.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
