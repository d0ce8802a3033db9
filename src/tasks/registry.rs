//! In-memory task registry
//!
//! Maps task identities to their `TaskStatus`. The id map sits behind a
//! read/write lock and every record behind its own mutex, so writes to one
//! task are serialized without blocking polls or writes for other tasks.
//! Entries are never evicted.

use super::status::TaskStatus;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

type Entry = Arc<Mutex<TaskStatus>>;

/// Shared, cloneable handle to the task map
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh running record, replacing any existing one
    pub async fn create(&self, task_id: &str) {
        let mut entries = self.entries.write().await;
        let previous = entries.insert(
            task_id.to_string(),
            Arc::new(Mutex::new(TaskStatus::running())),
        );
        if previous.is_some() {
            warn!(task_id = %task_id, "Task record overwritten by create");
        } else {
            debug!(task_id = %task_id, "Task record created");
        }
    }

    /// Create a running record only if none exists; returns true if created
    pub async fn get_or_create(&self, task_id: &str) -> bool {
        if self.entry(task_id).await.is_some() {
            return false;
        }

        let mut entries = self.entries.write().await;
        let mut created = false;
        entries.entry(task_id.to_string()).or_insert_with(|| {
            created = true;
            Arc::new(Mutex::new(TaskStatus::running()))
        });
        created
    }

    /// Snapshot of a task's current state
    pub async fn get(&self, task_id: &str) -> Option<TaskStatus> {
        let entry = self.entry(task_id).await?;
        let status = entry.lock().await;
        Some(status.clone())
    }

    /// Apply a mutation under the task's exclusive lock
    ///
    /// Returns `None` when the task is unknown.
    pub async fn update<F, R>(&self, task_id: &str, mutator: F) -> Option<R>
    where
        F: FnOnce(&mut TaskStatus) -> R,
    {
        let entry = self.entry(task_id).await?;
        let mut status = entry.lock().await;
        Some(mutator(&mut *status))
    }

    pub async fn contains(&self, task_id: &str) -> bool {
        self.entries.read().await.contains_key(task_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn entry(&self, task_id: &str) -> Option<Entry> {
        self.entries.read().await.get(task_id).cloned()
    }
}
