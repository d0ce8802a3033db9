//! Sequential pipeline execution
//!
//! `PipelineExecutor` is the seam the task layer depends on; `Crew` is the
//! LLM-backed implementation that runs each step against an `LlmProvider`.

use super::definition::{CrewDefinition, PreparedStep};
use super::output::{summarize, CrewOutput, StepSink, TaskOutput, UsageMetrics};
use super::CrewError;
use crate::llm::provider::{CompletionRequest, LlmProvider, Message};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, Instrument};

/// Inputs available to task templates (e.g. `chief_complaint`)
pub type CrewInputs = HashMap<String, String>;

/// Runs an ordered set of steps and reports each completion through a sink
#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    /// Number of configured steps
    fn step_count(&self) -> usize;

    /// Execute every step in order
    ///
    /// Emits each step's output through `sink` as soon as the step finishes.
    /// An error aborts the remaining steps.
    async fn kickoff(&self, inputs: &CrewInputs, sink: StepSink) -> Result<CrewOutput, CrewError>;
}

/// Builds a fresh executor for every run
pub trait CrewFactory: Send + Sync {
    fn build(&self) -> Box<dyn PipelineExecutor>;
}

/// Model parameters shared by every step of a crew
#[derive(Debug, Clone, PartialEq)]
pub struct CrewSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub summary_chars: usize,
}

impl Default for CrewSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: None,
            max_tokens: None,
            summary_chars: 100,
        }
    }
}

/// LLM-backed crew executing steps sequentially
pub struct Crew {
    definition: Arc<CrewDefinition>,
    llm: Arc<dyn LlmProvider>,
    settings: CrewSettings,
}

impl Crew {
    pub fn new(
        definition: Arc<CrewDefinition>,
        llm: Arc<dyn LlmProvider>,
        settings: CrewSettings,
    ) -> Self {
        Self {
            definition,
            llm,
            settings,
        }
    }

    fn build_request(&self, step: &PreparedStep, previous: &[TaskOutput]) -> CompletionRequest {
        let mut prompt = format!(
            "{}\n\nThis is the expected criteria for your final answer: {}\n\
             You MUST return the actual complete content as the final answer, not a summary.",
            step.description, step.expected_output
        );

        if !previous.is_empty() {
            prompt.push_str("\n\nThis is the context you're working with:\n");
            for output in previous {
                prompt.push_str(&format!("\n## {}\n{}\n", output.name, output.raw));
            }
        }

        CompletionRequest {
            messages: vec![
                Message::system(step.agent.system_prompt()),
                Message::user(prompt),
            ],
            model: self.settings.model.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            metadata: HashMap::from([("step".to_string(), step.name.clone())]),
        }
    }

    async fn run_step(
        &self,
        step: &PreparedStep,
        previous: &[TaskOutput],
        usage: &mut UsageMetrics,
    ) -> Result<TaskOutput, CrewError> {
        let request = self.build_request(step, previous);
        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|source| CrewError::Llm {
                step: step.name.clone(),
                source,
            })?;

        usage.record(&response.usage);

        let raw = response
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CrewError::EmptyOutput {
                step: step.name.clone(),
            })?;

        debug!(
            tokens = response.usage.total_tokens,
            chars = raw.len(),
            "Step produced output"
        );

        Ok(TaskOutput {
            name: step.name.clone(),
            agent: step.agent.name.clone(),
            description: step.description.clone(),
            summary: summarize(&step.expected_output, self.settings.summary_chars),
            raw,
        })
    }
}

#[async_trait]
impl PipelineExecutor for Crew {
    fn step_count(&self) -> usize {
        self.definition.tasks.len()
    }

    async fn kickoff(&self, inputs: &CrewInputs, sink: StepSink) -> Result<CrewOutput, CrewError> {
        let steps = self.definition.prepare(inputs)?;
        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(steps.len());
        let mut usage = UsageMetrics::default();

        for (index, step) in steps.iter().enumerate() {
            let span = crate::step_span!(
                task_id = %sink.task_id(),
                step = %step.name,
                agent = %step.agent.name,
                index
            );
            let output = self
                .run_step(step, &outputs, &mut usage)
                .instrument(span)
                .await?;

            sink.emit(output.clone());
            outputs.push(output);
        }

        info!(
            task_id = %sink.task_id(),
            steps = outputs.len(),
            total_tokens = usage.total_tokens,
            "Crew finished all steps"
        );

        let raw = outputs.last().map(|o| o.raw.clone()).unwrap_or_default();
        Ok(CrewOutput {
            raw,
            tasks_output: outputs,
            token_usage: usage,
        })
    }
}

/// Factory producing `Crew` instances that share one provider and definition
pub struct LlmCrewFactory {
    definition: Arc<CrewDefinition>,
    llm: Arc<dyn LlmProvider>,
    settings: CrewSettings,
}

impl LlmCrewFactory {
    pub fn new(
        definition: CrewDefinition,
        llm: Arc<dyn LlmProvider>,
        settings: CrewSettings,
    ) -> Result<Self, CrewError> {
        definition.validate()?;
        Ok(Self {
            definition: Arc::new(definition),
            llm,
            settings,
        })
    }
}

impl CrewFactory for LlmCrewFactory {
    fn build(&self) -> Box<dyn PipelineExecutor> {
        Box::new(Crew::new(
            self.definition.clone(),
            self.llm.clone(),
            self.settings.clone(),
        ))
    }
}
