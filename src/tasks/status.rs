//! Task status records and their state transitions
//!
//! A `TaskStatus` starts `running`, accumulates subtask results while the
//! pipeline runs, and is then sealed exactly once as `completed` or `failed`.
//! Every mutator refuses to touch a sealed record.

use crate::crew::{CrewOutput, TaskOutput};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

/// Completion record of one pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskStatus {
    /// Always `"completed"`: entries are only written when a step finishes
    pub status: String,
    pub description: String,
    pub summary: Option<String>,
}

impl SubtaskStatus {
    pub fn completed(description: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            status: "completed".to_string(),
            description: description.into(),
            summary: Some(summary.into()),
        }
    }
}

/// One `{description, output}` pair of `tasks_output`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutputEntry {
    pub description: String,
    pub output: String,
}

impl From<&TaskOutput> for TaskOutputEntry {
    fn from(output: &TaskOutput) -> Self {
        Self {
            description: output.description.clone(),
            output: output.raw.clone(),
        }
    }
}

/// Snapshot of one pipeline run as returned to polling clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: TaskState,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub subtasks: BTreeMap<String, SubtaskStatus>,
    pub tasks_output: Vec<TaskOutputEntry>,
    pub token_usage: BTreeMap<String, u64>,
}

impl TaskStatus {
    /// Fresh record for a newly accepted run
    pub fn running() -> Self {
        Self {
            status: TaskState::Running,
            result: None,
            error: None,
            subtasks: BTreeMap::new(),
            tasks_output: Vec::new(),
            token_usage: BTreeMap::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record a finished step; returns false if the record is already sealed
    ///
    /// Subtasks are keyed by description, so a later step with the same
    /// description replaces the earlier entry while `tasks_output` keeps both.
    pub fn record_subtask(&mut self, output: &TaskOutput) -> bool {
        if self.is_terminal() {
            return false;
        }

        self.subtasks.insert(
            output.description.clone(),
            SubtaskStatus::completed(&output.description, &output.summary),
        );
        self.tasks_output.push(TaskOutputEntry::from(output));
        true
    }

    /// Seal as completed with the pipeline's own accounting
    ///
    /// `tasks_output` and `token_usage` are replaced by what the pipeline
    /// returned; `subtasks` collected during the run are kept.
    pub fn complete(&mut self, output: &CrewOutput) -> bool {
        if self.is_terminal() {
            return false;
        }

        self.status = TaskState::Completed;
        self.result = Some(serde_json::Value::String(output.raw.clone()));
        self.error = None;
        self.tasks_output = output.tasks_output.iter().map(TaskOutputEntry::from).collect();
        self.token_usage = output.token_usage.to_map();
        true
    }

    /// Seal as failed, keeping whatever partial progress was recorded
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }

        self.status = TaskState::Failed;
        self.result = None;
        self.error = Some(message.into());
        true
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crew::UsageMetrics;
    use proptest::prelude::*;

    fn step(description: &str, raw: &str) -> TaskOutput {
        TaskOutput {
            name: description.replace(' ', "_"),
            agent: "history_taker".to_string(),
            description: description.to_string(),
            summary: "summary".to_string(),
            raw: raw.to_string(),
        }
    }

    fn crew_output(steps: &[TaskOutput]) -> CrewOutput {
        CrewOutput {
            raw: steps.last().map(|s| s.raw.clone()).unwrap_or_default(),
            tasks_output: steps.to_vec(),
            token_usage: UsageMetrics {
                total_tokens: 30,
                prompt_tokens: 20,
                completion_tokens: 10,
                successful_requests: steps.len() as u64,
            },
        }
    }

    #[test]
    fn test_running_record_serializes_with_nulls_and_empty_collections() {
        let json = serde_json::to_value(TaskStatus::running()).unwrap();

        assert_eq!(json["status"], "running");
        assert!(json["result"].is_null());
        assert!(json["error"].is_null());
        assert_eq!(json["subtasks"], serde_json::json!({}));
        assert_eq!(json["tasks_output"], serde_json::json!([]));
        assert_eq!(json["token_usage"], serde_json::json!({}));
    }

    #[test]
    fn test_record_subtask_appends_and_keys_by_description() {
        let mut status = TaskStatus::running();
        assert!(status.record_subtask(&step("gather history", "h")));
        assert!(status.record_subtask(&step("examine", "e")));

        assert_eq!(status.tasks_output.len(), 2);
        assert_eq!(status.tasks_output[1].output, "e");
        let subtask = &status.subtasks["gather history"];
        assert_eq!(subtask.status, "completed");
        assert_eq!(subtask.summary.as_deref(), Some("summary"));
    }

    #[test]
    fn test_duplicate_description_overwrites_subtask_but_keeps_outputs() {
        let mut status = TaskStatus::running();
        status.record_subtask(&step("reason", "first"));
        status.record_subtask(&step("reason", "second"));

        assert_eq!(status.subtasks.len(), 1);
        assert_eq!(status.tasks_output.len(), 2);
    }

    #[test]
    fn test_complete_replaces_outputs_and_keeps_subtasks() {
        let mut status = TaskStatus::running();
        status.record_subtask(&step("gather history", "partial"));

        let steps = vec![step("gather history", "h"), step("examine", "e")];
        assert!(status.complete(&crew_output(&steps)));

        assert_eq!(status.status, TaskState::Completed);
        assert_eq!(status.result, Some(serde_json::json!("e")));
        assert_eq!(status.tasks_output.len(), 2);
        assert_eq!(status.tasks_output[0].output, "h");
        assert_eq!(status.subtasks.len(), 1);
        assert_eq!(status.token_usage["total_tokens"], 30);
        assert!(status.error.is_none());
    }

    #[test]
    fn test_fail_keeps_partial_progress() {
        let mut status = TaskStatus::running();
        status.record_subtask(&step("gather history", "h"));

        assert!(status.fail("LLM unavailable"));
        assert_eq!(status.status, TaskState::Failed);
        assert_eq!(status.error.as_deref(), Some("LLM unavailable"));
        assert_eq!(status.tasks_output.len(), 1);
        assert!(status.result.is_none());
    }

    #[test]
    fn test_terminal_records_are_sealed() {
        let mut completed = TaskStatus::running();
        completed.complete(&crew_output(&[step("a", "1")]));
        let snapshot = completed.clone();

        assert!(!completed.record_subtask(&step("late", "x")));
        assert!(!completed.fail("too late"));
        assert!(!completed.complete(&crew_output(&[])));
        assert_eq!(completed, snapshot);

        let mut failed = TaskStatus::running();
        failed.fail("boom");
        assert!(!failed.complete(&crew_output(&[step("a", "1")])));
        assert_eq!(failed.status, TaskState::Failed);
    }

    proptest! {
        #[test]
        fn prop_tasks_output_only_extends(raws in proptest::collection::vec("[a-z]{1,8}", 0..20)) {
            let mut status = TaskStatus::running();
            let mut previous: Vec<TaskOutputEntry> = Vec::new();

            for (i, raw) in raws.iter().enumerate() {
                status.record_subtask(&step(&format!("step {}", i % 3), raw));
                prop_assert_eq!(status.tasks_output.len(), previous.len() + 1);
                prop_assert_eq!(&status.tasks_output[..previous.len()], &previous[..]);
                previous = status.tasks_output.clone();
            }
            prop_assert!(status.subtasks.len() <= 3);
        }
    }
}
