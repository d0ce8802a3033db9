//! Mock implementations for testing
//!
//! `MockLlmProvider` stands in for a real LLM backend; `ScriptedCrewFactory`
//! builds executors with a fixed number of steps, an optional failing step,
//! per-step delays and an optional gate, so task tracking can be exercised
//! without any network access.

use crate::crew::{
    CrewError, CrewFactory, CrewInputs, CrewOutput, PipelineExecutor, StepSink, TaskOutput,
    UsageMetrics,
};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
};
use crate::tasks::CHIEF_COMPLAINT_INPUT;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

/// Mock LLM provider returning canned responses in rotation
#[derive(Debug)]
pub struct MockLlmProvider {
    pub responses: Vec<String>,
    /// Number of calls that succeed before every call fails
    pub fail_after: Option<usize>,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            fail_after: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    pub fn with_failure() -> Self {
        Self::failing_after(0)
    }

    pub fn failing_after(successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            ..Self::single_response("Mock response")
        }
    }

    /// Every request received so far, in order
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut calls = self.calls.lock().await;
        let index = calls.len();
        let metadata = request.metadata.clone();
        calls.push(request);

        if self.fail_after.is_some_and(|limit| index >= limit) {
            return Err(LlmError::RequestFailed("Mock LLM failure".to_string()));
        }

        let content = if self.responses.is_empty() {
            "Mock response".to_string()
        } else {
            self.responses[index % self.responses.len()].clone()
        };

        Ok(CompletionResponse {
            content: Some(content),
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
            metadata,
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.fail_after == Some(0) {
            Err(LlmError::RequestFailed(
                "Mock health check failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Factory for executors that follow a fixed script
#[derive(Debug, Clone)]
pub struct ScriptedCrewFactory {
    steps: usize,
    fail_at: Option<usize>,
    step_delay: Duration,
    gate: Option<Arc<Semaphore>>,
    seen_inputs: Arc<Mutex<Vec<CrewInputs>>>,
}

impl ScriptedCrewFactory {
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            fail_at: None,
            step_delay: Duration::ZERO,
            gate: None,
            seen_inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail at the given 1-indexed step, after earlier steps have been emitted
    pub fn failing_at(mut self, step: usize) -> Self {
        self.fail_at = Some(step);
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Each step waits for one permit of the gate before running
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// The gate installed by `gated`, or a detached empty semaphore
    pub fn gate(&self) -> Arc<Semaphore> {
        self.gate.clone().unwrap_or_else(|| Arc::new(Semaphore::new(0)))
    }

    /// Inputs of every run started from this factory
    pub fn seen_inputs(&self) -> Arc<Mutex<Vec<CrewInputs>>> {
        self.seen_inputs.clone()
    }

    /// Description the scripted crew gives its 1-indexed step
    pub fn step_description(step: usize) -> String {
        format!("Scripted step {step}")
    }
}

impl CrewFactory for ScriptedCrewFactory {
    fn build(&self) -> Box<dyn PipelineExecutor> {
        Box::new(ScriptedCrew {
            script: self.clone(),
        })
    }
}

struct ScriptedCrew {
    script: ScriptedCrewFactory,
}

#[async_trait]
impl PipelineExecutor for ScriptedCrew {
    fn step_count(&self) -> usize {
        self.script.steps
    }

    async fn kickoff(&self, inputs: &CrewInputs, sink: StepSink) -> Result<CrewOutput, CrewError> {
        self.script.seen_inputs.lock().await.push(inputs.clone());
        let complaint = inputs
            .get(CHIEF_COMPLAINT_INPUT)
            .cloned()
            .unwrap_or_default();

        let mut outputs = Vec::with_capacity(self.script.steps);
        let mut usage = UsageMetrics::default();

        for step in 1..=self.script.steps {
            if let Some(gate) = &self.script.gate {
                gate.acquire()
                    .await
                    .map_err(|_| CrewError::InvalidDefinition("gate closed".to_string()))?
                    .forget();
            }
            if !self.script.step_delay.is_zero() {
                tokio::time::sleep(self.script.step_delay).await;
            }
            if self.script.fail_at == Some(step) {
                return Err(CrewError::Llm {
                    step: format!("step_{step}"),
                    source: LlmError::RequestFailed("scripted failure".to_string()),
                });
            }

            usage.record(&TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            });
            let output = TaskOutput {
                name: format!("step_{step}"),
                agent: "scripted_agent".to_string(),
                description: ScriptedCrewFactory::step_description(step),
                summary: format!("Expected output {step}"),
                raw: format!("output {step} for {complaint}"),
            };
            sink.emit(output.clone());
            outputs.push(output);
        }

        Ok(CrewOutput {
            raw: outputs.last().map(|o| o.raw.clone()).unwrap_or_default(),
            tasks_output: outputs,
            token_usage: usage,
        })
    }
}
