//! Concrete workers behind the supervisor's mode plan.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uci_checks::{CheckError, CheckRunner};
use uci_core::{CheckRequest, Config, MessageQueue, Mode, TaskKind, TaskResult, UciError, Workers};

use crate::http::{create_router, AppState, FailedCheck, HttpServer};
use crate::retry::RetryBook;
use crate::watcher;

const INTERRUPTED: &str = "interrupted by shutdown";

/// Runs the checks for one request.
#[async_trait]
pub trait CheckExecutor: Send + Sync {
    async fn execute(&self, request: &CheckRequest) -> Result<usize, CheckError>;
}

#[async_trait]
impl CheckExecutor for CheckRunner {
    async fn execute(&self, request: &CheckRequest) -> Result<usize, CheckError> {
        self.run(request).await
    }
}

/// Timing and addresses the workers need from the configuration.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub listen: String,
    pub work_dir: PathBuf,
    pub watch_interval: Duration,
    pub retry_interval: Duration,
    pub server_url: String,
    pub poll_interval: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            listen: config.http.listen.clone(),
            work_dir: config.core.work_dir.clone(),
            watch_interval: config.core.watch_interval(),
            retry_interval: config.core.retry_interval(),
            server_url: config.worker.server_url.trim_end_matches('/').to_string(),
            poll_interval: config.worker.poll_interval(),
        }
    }
}

pub struct ServiceWorkers {
    settings: WorkerSettings,
    queue: Option<Arc<dyn MessageQueue>>,
    retries: Arc<RetryBook>,
    executor: Arc<dyn CheckExecutor>,
    http: HttpServer,
    /// Worker to server traffic.
    client: reqwest::Client,
}

impl ServiceWorkers {
    pub fn new(
        settings: WorkerSettings,
        queue: Option<Arc<dyn MessageQueue>>,
        retries: Arc<RetryBook>,
        executor: Arc<dyn CheckExecutor>,
        client: reqwest::Client,
    ) -> Self {
        let http = HttpServer::new(settings.listen.clone());
        Self {
            settings,
            queue,
            retries,
            executor,
            http,
            client,
        }
    }

    fn queue(&self, task: TaskKind) -> Result<&Arc<dyn MessageQueue>, UciError> {
        self.queue.as_ref().ok_or_else(|| {
            UciError::Queue(format!("{} requires a message queue", task.name()))
        })
    }

    /// Run `request`, or give up on it when `token` fires first.
    async fn execute(
        &self,
        request: &CheckRequest,
        token: &CancellationToken,
    ) -> Result<usize, String> {
        tokio::select! {
            biased;
            result = self.executor.execute(request) => result.map_err(|e| e.to_string()),
            _ = token.cancelled() => Err(INTERRUPTED.to_string()),
        }
    }

    async fn watch(&self, task: TaskKind, token: CancellationToken) -> TaskResult {
        let queue = self.queue(task)?;
        watcher::watch(
            task.name(),
            &self.settings.work_dir,
            self.settings.watch_interval,
            queue.as_ref(),
            token,
        )
        .await
    }

    async fn pull_next(&self) -> Result<Option<CheckRequest>, CheckError> {
        let url = format!("{}/api/v1/checks/next", self.settings.server_url);
        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(CheckError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Working copies live under each process's own work dir, so the
    /// server's path is not used.
    async fn run_pulled(&self, request: CheckRequest, token: &CancellationToken) {
        let mut local = request.clone();
        local.repo_path = PathBuf::new();
        if let Err(e) = self.execute(&local, token).await {
            error!(delivery_id = %request.delivery_id, "check request failed: {}", e);
            self.report_failure(&request, &e).await;
        }
    }

    async fn report_failure(&self, request: &CheckRequest, error: &str) {
        let url = format!("{}/api/v1/checks/failed", self.settings.server_url);
        let body = FailedCheck {
            request: request.clone(),
            error: error.to_string(),
        };
        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(delivery_id = %request.delivery_id, "reported failed check to server");
            }
            Ok(response) => warn!(
                delivery_id = %request.delivery_id,
                status = response.status().as_u16(),
                "server refused failed check report"
            ),
            Err(e) => warn!(
                delivery_id = %request.delivery_id,
                "cannot report failed check to server: {}", e
            ),
        }
    }
}

#[async_trait]
impl Workers for ServiceWorkers {
    async fn run_http_server(&self, mode: Mode, token: CancellationToken) -> TaskResult {
        let state = AppState {
            mode,
            queue: self.queue.clone(),
            retries: self.retries.clone(),
        };
        self.http.run(create_router(state), token).await
    }

    async fn shutdown_http_server(&self, deadline: Duration) -> uci_core::Result<()> {
        self.http.shutdown(deadline).await
    }

    async fn retry_errors(&self, token: CancellationToken) {
        let queue = match self.queue(TaskKind::RetryErrors) {
            Ok(queue) => queue,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(self.settings.retry_interval) => {}
            }
            match self.retries.republish(queue.as_ref()).await {
                Ok(pass) if pass.requeued + pass.dropped > 0 => {
                    info!(requeued = pass.requeued, dropped = pass.dropped, "retry pass finished");
                }
                Ok(_) => {}
                Err(e) => error!("retry pass failed: {}", e),
            }
        }
    }

    async fn message_subscription(&self, token: CancellationToken) {
        let queue = match self.queue(TaskKind::MessageSubscription) {
            Ok(queue) => queue,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };
        while let Some(request) = queue.next(&token).await {
            if let Err(e) = self.execute(&request, &token).await {
                error!(delivery_id = %request.delivery_id, "check request failed: {}", e);
                if let Err(e) = self.retries.record_failure(&request, &e).await {
                    error!(delivery_id = %request.delivery_id, "cannot store retry record: {}", e);
                }
            }
        }
        debug!("message subscription stopped");
    }

    async fn worker_message_subscription(&self, token: CancellationToken) {
        info!(server = %self.settings.server_url, "pulling check requests");
        loop {
            let pulled = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                pulled = self.pull_next() => pulled,
            };
            match pulled {
                Ok(Some(request)) => {
                    self.run_pulled(request, &token).await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => warn!("cannot pull check request: {}", e),
            }
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    async fn watch_local_repo(&self, token: CancellationToken) -> TaskResult {
        self.watch(TaskKind::LocalRepoWatcher, token).await
    }

    async fn watch_server_worker_repo(&self, token: CancellationToken) -> TaskResult {
        self.watch(TaskKind::ServerWorkerRepoWatcher, token).await
    }
}
