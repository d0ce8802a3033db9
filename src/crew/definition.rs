//! Crew definitions: agents, ordered tasks, and input interpolation
//!
//! A definition is static configuration. Each run interpolates the caller's
//! inputs into the task templates before any step executes.

use super::CrewError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder pattern"));

/// One LLM-driven agent of the crew
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDefinition {
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

impl AgentDefinition {
    /// System prompt handed to the LLM for every step this agent performs
    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}. {}\n\nYour personal goal is: {}",
            self.role, self.backstory, self.goal
        )
    }
}

/// One step of the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDefinition {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    /// Name of the agent that performs this step
    pub agent: String,
}

/// Ordered agents and tasks making up a crew
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrewDefinition {
    pub agents: Vec<AgentDefinition>,
    pub tasks: Vec<TaskDefinition>,
}

/// A task with inputs interpolated and its agent resolved
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStep {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    pub agent: AgentDefinition,
}

impl CrewDefinition {
    /// Check that the crew can run: tasks present, agents unique and resolvable
    pub fn validate(&self) -> Result<(), CrewError> {
        if self.tasks.is_empty() {
            return Err(CrewError::InvalidDefinition(
                "crew must define at least one task".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for agent in &self.agents {
            if !names.insert(agent.name.as_str()) {
                return Err(CrewError::InvalidDefinition(format!(
                    "duplicate agent name '{}'",
                    agent.name
                )));
            }
        }

        for task in &self.tasks {
            if !names.contains(task.agent.as_str()) {
                return Err(CrewError::InvalidDefinition(format!(
                    "task '{}' references unknown agent '{}'",
                    task.name, task.agent
                )));
            }
        }

        Ok(())
    }

    fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// Interpolate inputs into every task, in declaration order
    ///
    /// Fails before anything runs if a template references an input that was
    /// not supplied.
    pub fn prepare(&self, inputs: &HashMap<String, String>) -> Result<Vec<PreparedStep>, CrewError> {
        self.tasks
            .iter()
            .map(|task| {
                let agent = self.agent(&task.agent).ok_or_else(|| {
                    CrewError::InvalidDefinition(format!(
                        "task '{}' references unknown agent '{}'",
                        task.name, task.agent
                    ))
                })?;

                Ok(PreparedStep {
                    name: task.name.clone(),
                    description: interpolate(&task.description, inputs)?,
                    expected_output: interpolate(&task.expected_output, inputs)?,
                    agent: agent.clone(),
                })
            })
            .collect()
    }
}

/// Replace `{name}` placeholders with input values
pub fn interpolate(template: &str, inputs: &HashMap<String, String>) -> Result<String, CrewError> {
    let mut missing = None;
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        match inputs.get(&caps[1]) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| caps[1].to_string());
                caps[0].to_string()
            }
        }
    });

    match missing {
        Some(name) => Err(CrewError::MissingInput { name }),
        None => Ok(rendered.into_owned()),
    }
}

impl Default for CrewDefinition {
    fn default() -> Self {
        let agents = vec![
            AgentDefinition {
                name: "history_taker".to_string(),
                role: "Clinical History Taker".to_string(),
                goal: "Elicit a complete and structured medical history for the chief complaint"
                    .to_string(),
                backstory: "An experienced primary care physician known for thorough, \
                            patient-centred interviews that surface the details others miss."
                    .to_string(),
            },
            AgentDefinition {
                name: "examiner".to_string(),
                role: "Physical Examiner".to_string(),
                goal: "Determine the examination findings most relevant to the presenting history"
                    .to_string(),
                backstory: "A hospitalist who turns a history into a focused, \
                            hypothesis-driven physical examination."
                    .to_string(),
            },
            AgentDefinition {
                name: "diagnostician".to_string(),
                role: "Diagnostician".to_string(),
                goal: "Produce a ranked, well-reasoned differential diagnosis".to_string(),
                backstory: "An internist who reasons probabilistically and explains \
                            which findings move each diagnosis up or down."
                    .to_string(),
            },
        ];

        let task = |name: &str, agent: &str, description: &str, expected_output: &str| {
            TaskDefinition {
                name: name.to_string(),
                description: description.to_string(),
                expected_output: expected_output.to_string(),
                agent: agent.to_string(),
            }
        };

        let tasks = vec![
            task(
                "gather_history_task",
                "history_taker",
                "Take a focused history for a patient presenting with: {chief_complaint}. \
                 Cover onset, character, timing, associated symptoms, past medical history, \
                 medications, and relevant risk factors.",
                "A structured history of present illness with pertinent positives and negatives.",
            ),
            task(
                "perform_examination_task",
                "examiner",
                "Based on the history for '{chief_complaint}', describe the focused physical \
                 examination and the findings that would discriminate between likely causes.",
                "A list of examination manoeuvres with the expected findings for each.",
            ),
            task(
                "generate_differential_diagnosis_task",
                "diagnostician",
                "Using the history and examination, generate a differential diagnosis for \
                 '{chief_complaint}'.",
                "A ranked differential diagnosis with supporting and opposing evidence for each.",
            ),
            task(
                "bayesian_reasoning_task",
                "diagnostician",
                "Apply Bayesian reasoning to the differential for '{chief_complaint}': estimate \
                 pre-test probabilities and update them with the gathered findings.",
                "Each diagnosis with pre-test and post-test probability estimates and rationale.",
            ),
            task(
                "synthesize_diagnostic_framework_task",
                "diagnostician",
                "Synthesize the previous work into a diagnostic framework for \
                 '{chief_complaint}', including next investigations.",
                "A final diagnostic summary with leading diagnosis, must-not-miss conditions, \
                 and recommended next steps.",
            ),
        ];

        Self { agents, tasks }
    }
}
