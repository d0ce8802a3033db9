//! Request handlers

use super::ApiState;
use crate::observability::metrics::metrics;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use warp::{Rejection, Reply};

/// Rejection for a status lookup of an unknown task id
#[derive(Debug)]
pub struct TaskNotFound;

impl warp::reject::Reject for TaskNotFound {}

/// Body of `POST /kickoff`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickoffRequest {
    pub inputs: KickoffInputs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickoffInputs {
    pub chief_complaint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickoffResponse {
    pub task_id: String,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub tasks_tracked: usize,
    /// `ok` or `unreachable`; absent when no provider is attached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<String>,
}

pub async fn kickoff(request: KickoffRequest, state: ApiState) -> Result<impl Reply, Rejection> {
    let task_id = state
        .orchestrator
        .kickoff(request.inputs.chief_complaint)
        .await;
    Ok(warp::reply::json(&KickoffResponse { task_id }))
}

pub async fn status(task_id: String, state: ApiState) -> Result<impl Reply, Rejection> {
    match state.orchestrator.registry().get(&task_id).await {
        Some(status) => Ok(warp::reply::json(&status)),
        None => {
            debug!(task_id = %task_id, "Status requested for unknown task");
            Err(warp::reject::custom(TaskNotFound))
        }
    }
}

pub async fn health(state: ApiState) -> Result<impl Reply, Rejection> {
    let llm = match state.llm() {
        Some(provider) => match provider.health_check().await {
            Ok(()) => Some("ok"),
            Err(e) => {
                warn!(provider = provider.name(), "LLM health check failed: {}", e);
                Some("unreachable")
            }
        },
        None => None,
    };
    let status = if llm == Some("unreachable") {
        "degraded"
    } else {
        "healthy"
    };

    let response = HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_seconds: metrics().uptime_seconds(),
        tasks_tracked: state.orchestrator.registry().len().await,
        llm: llm.map(str::to_string),
    };
    Ok(warp::reply::json(&response))
}

pub async fn metrics_snapshot() -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&metrics().snapshot()))
}
