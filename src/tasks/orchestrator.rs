//! Background pipeline runs
//!
//! `kickoff` registers a task and spawns its run; the HTTP caller gets the id
//! back immediately. A run wires a task-bound `StepSink` into a freshly built
//! executor, drains every completion through the aggregator, and only then
//! seals the record. Sealing after the drain means no step callback can land
//! after, or interleave with, the terminal write.

use super::aggregator::CallbackAggregator;
use super::registry::TaskRegistry;
use super::status::TaskState;
use crate::crew::{CrewFactory, CrewInputs, StepSink};
use crate::error::ServiceError;
use crate::observability::metrics::metrics;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Input key under which the complaint is handed to the crew
pub const CHIEF_COMPLAINT_INPUT: &str = "chief_complaint";

/// Starts pipeline runs and finalizes their task records
#[derive(Clone)]
pub struct RunOrchestrator {
    registry: TaskRegistry,
    aggregator: CallbackAggregator,
    factory: Arc<dyn CrewFactory>,
}

impl RunOrchestrator {
    pub fn new(registry: TaskRegistry, factory: Arc<dyn CrewFactory>) -> Self {
        Self {
            aggregator: CallbackAggregator::new(registry.clone()),
            registry,
            factory,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Register a new running task and start its pipeline in the background
    pub async fn kickoff(&self, chief_complaint: String) -> String {
        let (task_id, _handle) = self.spawn(chief_complaint).await;
        task_id
    }

    /// Like `kickoff`, but also returns the handle of the background run
    pub async fn spawn(&self, chief_complaint: String) -> (String, JoinHandle<TaskState>) {
        let task_id = Uuid::new_v4().to_string();
        self.registry.create(&task_id).await;
        metrics().record_task_started();

        info!(task_id = %task_id, "Task accepted; scheduling crew run");

        let orchestrator = self.clone();
        let run_id = task_id.clone();
        let span = crate::task_span!(task_id = %task_id);
        let handle = tokio::spawn(
            async move { orchestrator.run(&run_id, chief_complaint).await }.instrument(span),
        );

        (task_id, handle)
    }

    /// Execute one full pipeline run and seal the task record
    pub async fn run(&self, task_id: &str, chief_complaint: String) -> TaskState {
        info!(
            task_id = %task_id,
            complaint_chars = chief_complaint.chars().count(),
            "Starting crew run"
        );

        let crew = self.factory.build();
        let expected_steps = crew.step_count();
        let inputs = CrewInputs::from([(CHIEF_COMPLAINT_INPUT.to_string(), chief_complaint)]);

        let (sink, receiver) = StepSink::channel(task_id);
        let aggregator = self.aggregator.clone();
        let consumer = tokio::spawn(async move { aggregator.consume(receiver).await });

        // The sink moves into the run; the channel closes when the run ends or unwinds.
        let runner = tokio::spawn(
            async move { crew.kickoff(&inputs, sink).await }.in_current_span(),
        );
        let outcome = match runner.await {
            Ok(result) => result.map_err(|e| ServiceError::from(e).public_message()),
            Err(e) => Err(ServiceError::internal(format!("crew run aborted: {e}")).public_message()),
        };

        match consumer.await {
            Ok(handled) => debug!(task_id = %task_id, handled, "Step completions drained"),
            Err(e) => error!(task_id = %task_id, "Step completion consumer failed: {}", e),
        }

        match outcome {
            Ok(output) => {
                let observed = self
                    .registry
                    .get(task_id)
                    .await
                    .map(|s| s.tasks_output.len())
                    .unwrap_or(0);
                if observed != output.tasks_output.len() {
                    debug!(
                        task_id = %task_id,
                        observed,
                        returned = output.tasks_output.len(),
                        "Callback-observed outputs differ from pipeline result; using pipeline result"
                    );
                }

                let sealed = self
                    .registry
                    .update(task_id, |status| status.complete(&output))
                    .await;
                self.log_seal(task_id, sealed, TaskState::Completed);

                metrics().record_task_completed(output.token_usage.total_tokens);
                info!(
                    task_id = %task_id,
                    steps = output.tasks_output.len(),
                    expected_steps,
                    total_tokens = output.token_usage.total_tokens,
                    "All crew steps completed"
                );
                TaskState::Completed
            }
            Err(message) => {
                error!(task_id = %task_id, "Crew run failed: {}", message);

                let sealed = self
                    .registry
                    .update(task_id, |status| status.fail(message))
                    .await;
                self.log_seal(task_id, sealed, TaskState::Failed);

                metrics().record_task_failed();
                TaskState::Failed
            }
        }
    }

    fn log_seal(&self, task_id: &str, sealed: Option<bool>, state: TaskState) {
        match sealed {
            Some(true) => {}
            Some(false) => warn!(
                task_id = %task_id,
                ?state,
                "Task record was already terminal; final write skipped"
            ),
            None => warn!(
                task_id = %task_id,
                ?state,
                "Task record vanished before the final write"
            ),
        }
    }
}
