//! Diagnosis Crew Service
//!
//! Background-task HTTP API around a sequential multi-agent "diagnosis crew".
//! A client submits a chief complaint, gets a task id back immediately, and
//! polls for per-step progress and the final differential diagnosis.
//!
//! # Overview
//!
//! - [`crew`]: crew definitions and the LLM-backed sequential pipeline
//! - [`tasks`]: task registry, step-completion aggregation and run orchestration
//! - [`api`]: warp routes with bearer authentication and CORS
//! - [`llm`]: provider abstraction with an OpenAI backend
//! - [`config`], [`observability`], [`error`]: configuration, logging/metrics, errors
//!
//! # Quick Start
//!
//! ```rust
//! use diagnosis_crew::tasks::{RunOrchestrator, TaskRegistry, TaskState};
//! use diagnosis_crew::testing::ScriptedCrewFactory;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = TaskRegistry::new();
//! let orchestrator = RunOrchestrator::new(registry.clone(), Arc::new(ScriptedCrewFactory::new(5)));
//!
//! let (task_id, run) = orchestrator.spawn("chest pain on exertion".to_string()).await;
//! assert_eq!(run.await.unwrap(), TaskState::Completed);
//!
//! let status = registry.get(&task_id).await.unwrap();
//! assert_eq!(status.tasks_output.len(), 5);
//! # }
//! ```

pub mod api;
pub mod config;
pub mod crew;
pub mod error;
pub mod llm;
pub mod observability;
pub mod tasks;
pub mod testing;

pub use config::{ConfigError, ServiceConfig};
pub use error::{ServiceError, ServiceResult};
pub use tasks::{RunOrchestrator, TaskRegistry, TaskState, TaskStatus};
