//! Diagnosis crew: the sequential multi-agent pipeline
//!
//! The task layer only sees the `PipelineExecutor` and `CrewFactory` traits.
//! `Crew` is the LLM-backed implementation built from a `CrewDefinition`.

pub mod definition;
pub mod executor;
pub mod output;

pub use definition::{AgentDefinition, CrewDefinition, PreparedStep, TaskDefinition};
pub use executor::{Crew, CrewFactory, CrewInputs, CrewSettings, LlmCrewFactory, PipelineExecutor};
pub use output::{CrewOutput, StepCompletion, StepSink, TaskOutput, UsageMetrics};

use crate::llm::provider::LlmError;
use thiserror::Error;

/// Pipeline execution errors
#[derive(Debug, Clone, Error)]
pub enum CrewError {
    #[error("Missing input '{name}' referenced by a task template")]
    MissingInput { name: String },

    #[error("Step '{step}' failed: {source}")]
    Llm {
        step: String,
        #[source]
        source: LlmError,
    },

    #[error("Step '{step}' produced no output")]
    EmptyOutput { step: String },

    #[error("Invalid crew definition: {0}")]
    InvalidDefinition(String),
}
