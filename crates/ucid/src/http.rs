//! HTTP endpoint.
//!
//! Routes:
//!
//! * `GET  /health` status, mode and queue depth
//! * `GET  /version` user agent
//! * `POST /api/v1/checks` enqueue a check request (Local, Server)
//! * `GET  /api/v1/checks/next` hand the next request to a worker (Server)
//! * `POST /api/v1/checks/failed` a worker reports a failed request (Server)

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uci_core::{CheckRequest, MessageQueue, Mode, TaskResult, UciError};

use crate::retry::RetryBook;

#[derive(Clone)]
pub struct AppState {
    pub mode: Mode,
    pub queue: Option<Arc<dyn MessageQueue>>,
    pub retries: Arc<RetryBook>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub delivery_id: String,
}

/// A worker's report of a request it could not complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedCheck {
    pub request: CheckRequest,
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("no message queue in {0} mode")]
    NoQueue(Mode),

    #[error("not available in {0} mode")]
    WrongMode(Mode),

    #[error("{0}")]
    Queue(String),

    #[error("{0}")]
    Store(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NoQueue(_) | ApiError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::WrongMode(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/api/v1/checks", post(enqueue_handler))
        .route("/api/v1/checks/next", get(next_handler))
        .route("/api/v1/checks/failed", post(failed_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let queued = match &state.queue {
        Some(queue) => Some(queue.len().await),
        None => None,
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        mode: state.mode,
        queued,
    })
}

async fn version_handler() -> String {
    uci_core::user_agent()
}

async fn enqueue_handler(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let queue = state.queue.as_ref().ok_or(ApiError::NoQueue(state.mode))?;
    let delivery_id = request.delivery_id.clone();
    queue
        .publish(request)
        .await
        .map_err(|e| ApiError::Queue(e.to_string()))?;
    info!(%delivery_id, "accepted check request");
    Ok((StatusCode::ACCEPTED, Json(Accepted { delivery_id })))
}

async fn next_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    if state.mode != Mode::Server {
        return Err(ApiError::WrongMode(state.mode));
    }
    let queue = state.queue.as_ref().ok_or(ApiError::NoQueue(state.mode))?;
    Ok(match queue.try_next().await {
        Some(request) => Json(request).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn failed_handler(
    State(state): State<AppState>,
    Json(failed): Json<FailedCheck>,
) -> Result<StatusCode, ApiError> {
    if state.mode != Mode::Server {
        return Err(ApiError::WrongMode(state.mode));
    }
    warn!(
        delivery_id = %failed.request.delivery_id,
        error = %failed.error,
        "worker reported failed check"
    );
    state
        .retries
        .record_failure(&failed.request, &failed.error)
        .await
        .map_err(|e| ApiError::Store(e.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

/// Lifecycle of the listening socket.
pub struct HttpServer {
    listen: String,
    stop: watch::Sender<bool>,
    phase: watch::Sender<Phase>,
}

impl HttpServer {
    pub fn new(listen: impl Into<String>) -> Self {
        Self {
            listen: listen.into(),
            stop: watch::channel(false).0,
            phase: watch::channel(Phase::Idle).0,
        }
    }

    /// Serve `router` until `token` is cancelled or [`HttpServer::shutdown`]
    /// is called.
    pub async fn run(&self, router: Router, token: CancellationToken) -> TaskResult {
        let listener = tokio::net::TcpListener::bind(&self.listen)
            .await
            .map_err(|e| {
                self.phase.send_replace(Phase::Stopped);
                UciError::Server(format!("cannot listen on {}: {}", self.listen, e))
            })?;
        self.phase.send_replace(Phase::Running);
        info!("HTTP server listening on http://{}", self.listen);

        let mut stop = self.stop.subscribe();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = stop.wait_for(|stop| *stop) => {}
                }
                info!("Starting graceful shutdown...");
            })
            .await;

        self.phase.send_replace(Phase::Stopped);
        info!("HTTP server shutdown complete");
        served.map_err(|e| UciError::Server(e.to_string()))
    }

    /// Stop accepting connections and wait for in-flight requests, at most
    /// `deadline`. A server that never started is already stopped.
    pub async fn shutdown(&self, deadline: Duration) -> uci_core::Result<()> {
        if *self.phase.borrow() == Phase::Idle {
            return Ok(());
        }
        self.stop.send_replace(true);

        let mut phase = self.phase.subscribe();
        let stopped = tokio::time::timeout(deadline, phase.wait_for(|p| *p == Phase::Stopped))
            .await
            .is_ok();
        if stopped {
            Ok(())
        } else {
            Err(UciError::Server(format!(
                "shutdown did not finish within {:?}",
                deadline
            )))
        }
    }
}
