//! Step and crew outputs, token accounting, and the per-run completion sink

use crate::llm::provider::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::warn;

/// Output of one completed step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskOutput {
    /// Task name from the definition
    pub name: String,
    /// Agent that performed the step
    pub agent: String,
    pub description: String,
    /// Leading characters of the step's expected-output template
    pub summary: String,
    pub raw: String,
}

/// Accumulated LLM usage for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub successful_requests: u64,
}

impl UsageMetrics {
    /// Add one successful completion's usage
    pub fn record(&mut self, usage: &TokenUsage) {
        self.total_tokens += u64::from(usage.total_tokens);
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.successful_requests += 1;
    }

    /// Field-name to count map as exposed on task records
    pub fn to_map(&self) -> BTreeMap<String, u64> {
        BTreeMap::from([
            ("total_tokens".to_string(), self.total_tokens),
            ("prompt_tokens".to_string(), self.prompt_tokens),
            ("completion_tokens".to_string(), self.completion_tokens),
            ("successful_requests".to_string(), self.successful_requests),
        ])
    }
}

/// Result of a full pipeline run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrewOutput {
    /// Raw output of the final step
    pub raw: String,
    /// Per-step outputs in execution order
    pub tasks_output: Vec<TaskOutput>,
    pub token_usage: UsageMetrics,
}

/// Completion event routed to the aggregator
#[derive(Debug, Clone, PartialEq)]
pub struct StepCompletion {
    pub task_id: String,
    pub output: TaskOutput,
}

/// Task-bound sender handed to an executor for one run
///
/// Every output emitted through the sink is attributed to the task identity
/// the sink was created for.
#[derive(Debug, Clone)]
pub struct StepSink {
    task_id: String,
    sender: mpsc::UnboundedSender<StepCompletion>,
}

impl StepSink {
    /// Create a sink and the receiver its completions arrive on
    pub fn channel(task_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<StepCompletion>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                task_id: task_id.into(),
                sender,
            },
            receiver,
        )
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Report a completed step; never blocks
    pub fn emit(&self, output: TaskOutput) {
        let event = StepCompletion {
            task_id: self.task_id.clone(),
            output,
        };
        if self.sender.send(event).is_err() {
            warn!(task_id = %self.task_id, "Step completion dropped: aggregator is gone");
        }
    }
}

/// First `chars` characters of a template, cut on a character boundary
pub fn summarize(template: &str, chars: usize) -> String {
    template.chars().take(chars).collect()
}
