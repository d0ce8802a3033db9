//! HTTP API
//!
//! - `POST /kickoff` (bearer) starts a crew run and returns its task id
//! - `GET /status/{task_id}` (bearer) returns the task record
//! - `GET /health` and `GET /metrics` are open for probes and scrapers

pub mod auth;
pub mod handlers;
pub mod rejection;

pub use auth::Unauthorized;
pub use handlers::{HealthResponse, KickoffInputs, KickoffRequest, KickoffResponse, TaskNotFound};
pub use rejection::{handle_rejection, ErrorResponse};

use crate::error::ServiceError;
use crate::llm::provider::LlmProvider;
use crate::tasks::RunOrchestrator;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use warp::{Filter, Reply};

/// Largest accepted request body
pub const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Shared handles every route needs
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: RunOrchestrator,
    token: Arc<str>,
    /// Provider probed by `GET /health`, when one is attached
    llm: Option<Arc<dyn LlmProvider>>,
}

impl ApiState {
    pub fn new(orchestrator: RunOrchestrator, token: impl Into<Arc<str>>) -> Self {
        Self {
            orchestrator,
            token: token.into(),
            llm: None,
        }
    }

    /// Report this provider's reachability on `GET /health`
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub(crate) fn llm(&self) -> Option<&Arc<dyn LlmProvider>> {
        self.llm.as_ref()
    }
}

fn with_state(state: ApiState) -> impl Filter<Extract = (ApiState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn cors(origin: &str) -> warp::cors::Builder {
    warp::cors()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allow_headers(vec![
            "accept",
            "accept-language",
            "authorization",
            "cache-control",
            "content-language",
            "content-type",
            "origin",
            "x-requested-with",
        ])
}

/// Whole milliseconds, saturating at `u64::MAX`
fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn log_request(info: warp::log::Info<'_>) {
    info!(
        method = %info.method(),
        path = info.path(),
        status = info.status().as_u16(),
        elapsed_ms = elapsed_ms(info.elapsed()),
        "HTTP request"
    );
}

/// Every route, with CORS, rejection handling and request logging applied
///
/// `cors_origin` must already be a normalized origin.
pub fn routes(
    state: ApiState,
    cors_origin: &str,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let kickoff = warp::path("kickoff")
        .and(warp::path::end())
        .and(warp::post())
        .and(auth::bearer(state.token.clone()))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(handlers::kickoff);

    let status = warp::path("status")
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(auth::bearer(state.token.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::status);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::health);

    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(handlers::metrics_snapshot);

    kickoff
        .or(status)
        .or(health)
        .or(metrics)
        .recover(handle_rejection)
        .with(cors(cors_origin))
        .recover(handle_rejection)
        .with(warp::log::custom(log_request))
        .with(warp::trace(|info: warp::trace::Info<'_>| {
            crate::request_span!(method = %info.method(), path = %info.path())
        }))
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve(
    state: ApiState,
    addr: SocketAddr,
    cors_origin: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServiceError> {
    let (bound, server) = warp::serve(routes(state, cors_origin))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| ServiceError::server(format!("failed to bind {addr}: {e}")))?;

    info!(address = %bound, cors_origin, "HTTP API listening");
    server.await;
    info!("HTTP API stopped");
    Ok(())
}
