//! Step-completion aggregation
//!
//! Turns `StepCompletion` events into registry mutations. Nothing here ever
//! returns an error: bad events are logged and dropped.

use super::registry::TaskRegistry;
use crate::crew::StepCompletion;
use crate::observability::metrics::metrics;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outcome of handling one completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Recorded,
    /// Task was unknown; a running record was created first
    RecordedAfterCreate,
    /// Record is already completed or failed
    DroppedTerminal,
    /// Event lacked a task id or description
    DroppedMalformed,
}

/// Applies step completions to the task registry
#[derive(Debug, Clone)]
pub struct CallbackAggregator {
    registry: TaskRegistry,
}

impl CallbackAggregator {
    pub fn new(registry: TaskRegistry) -> Self {
        Self { registry }
    }

    /// Record one completed step against its task
    pub async fn handle(&self, event: StepCompletion) -> Aggregation {
        let StepCompletion { task_id, output } = event;

        if task_id.trim().is_empty() || output.description.trim().is_empty() {
            warn!(
                task_id = %task_id,
                step = %output.name,
                "Dropping malformed step completion"
            );
            metrics().record_event_dropped();
            return Aggregation::DroppedMalformed;
        }

        let created = self.registry.get_or_create(&task_id).await;
        if created {
            debug!(task_id = %task_id, "Step completion arrived before task record; created it");
        }

        let recorded = self
            .registry
            .update(&task_id, |status| status.record_subtask(&output))
            .await
            .unwrap_or(false);

        if !recorded {
            warn!(
                task_id = %task_id,
                step = %output.name,
                "Dropping step completion for a finished task"
            );
            metrics().record_event_dropped();
            return Aggregation::DroppedTerminal;
        }

        metrics().record_subtask_completed();
        info!(
            task_id = %task_id,
            step = %output.name,
            agent = %output.agent,
            "Subtask completed"
        );

        if created {
            Aggregation::RecordedAfterCreate
        } else {
            Aggregation::Recorded
        }
    }

    /// Handle events in arrival order until every sender is dropped
    pub async fn consume(&self, mut receiver: mpsc::UnboundedReceiver<StepCompletion>) -> usize {
        let mut handled = 0;
        while let Some(event) = receiver.recv().await {
            self.handle(event).await;
            handled += 1;
        }
        handled
    }
}
