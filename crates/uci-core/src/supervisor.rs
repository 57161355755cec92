//! Supervisor: runs the mode plan under one cancellation scope and shuts it
//! down in a fixed order.
//!
//! Shutdown sequence, once a termination signal arrives or the scope is
//! cancelled for any other reason (a task error, or every task returning):
//!
//! 1. cancel the scope,
//! 2. request HTTP server shutdown, bounded by `http_deadline`,
//! 3. wait up to `drain_deadline` for every task to exit.
//!
//! Exceeding either deadline is logged, never fatal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::Result;
use crate::mode::Mode;
use crate::obs;
use crate::plan::{plan, TaskKind};
use crate::task_group::{TaskGroup, TaskResult};

/// The long-running procedures a mode plan draws from.
///
/// Every procedure must return promptly once `token` is cancelled.
#[async_trait]
pub trait Workers: Send + Sync + 'static {
    /// Serve HTTP until `token` is cancelled or a shutdown is requested.
    async fn run_http_server(&self, mode: Mode, token: CancellationToken) -> TaskResult;

    /// Ask the HTTP server to stop and wait for it, at most `deadline`.
    async fn shutdown_http_server(&self, deadline: Duration) -> Result<()>;

    async fn retry_errors(&self, token: CancellationToken);

    async fn message_subscription(&self, token: CancellationToken);

    async fn worker_message_subscription(&self, token: CancellationToken);

    async fn watch_local_repo(&self, token: CancellationToken) -> TaskResult;

    async fn watch_server_worker_repo(&self, token: CancellationToken) -> TaskResult;
}

/// Shutdown deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownPolicy {
    pub http_deadline: Duration,
    pub drain_deadline: Duration,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            http_deadline: Duration::from_secs(60),
            drain_deadline: Duration::from_secs(60),
        }
    }
}

/// Why the supervisor left steady state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal,
    ScopeCancelled,
}

impl ShutdownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownReason::Signal => "signal",
            ShutdownReason::ScopeCancelled => "scope_cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    pub reason: ShutdownReason,
    /// Every task exited within the drain deadline.
    pub drained: bool,
}

pub struct Supervisor {
    workers: Arc<dyn Workers>,
    mode: Mode,
    enable_retries: bool,
    policy: ShutdownPolicy,
}

impl Supervisor {
    pub fn new(workers: Arc<dyn Workers>, mode: Mode, enable_retries: bool) -> Self {
        Self {
            workers,
            mode,
            enable_retries,
            policy: ShutdownPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Launch the plan for the configured mode and block until `shutdown`
    /// resolves or the scope is cancelled, then shut down.
    pub async fn run<S>(self, shutdown: S) -> SupervisorReport
    where
        S: Future<Output = ()> + Send,
    {
        let parent = CancellationToken::new();
        let scope = parent.child_token();
        let mut group = TaskGroup::new(scope.clone());

        for kind in plan(self.mode, self.enable_retries) {
            spawn_task(&mut group, kind, self.workers.clone(), self.mode);
        }

        let (leave_tx, leave_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            if let Err(e) = group.wait().await {
                error!("{}", e);
            }
            let _ = leave_tx.send(());
        });

        let reason = tokio::select! {
            _ = shutdown => ShutdownReason::Signal,
            _ = scope.cancelled() => ShutdownReason::ScopeCancelled,
        };
        obs::emit_shutdown(reason.as_str());

        parent.cancel();

        let deadline = self.policy.http_deadline;
        match tokio::time::timeout(deadline, self.workers.shutdown_http_server(deadline)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Error in shutdown_http_server: {}", e),
            Err(_) => error!("HTTP server shutdown exceeded {:?}", deadline),
        }

        let drained = match tokio::time::timeout(self.policy.drain_deadline, leave_rx).await {
            Ok(_) => true,
            Err(_) => {
                info!("Waiting for leave times out.");
                false
            }
        };

        SupervisorReport { reason, drained }
    }
}

fn spawn_task(group: &mut TaskGroup, kind: TaskKind, workers: Arc<dyn Workers>, mode: Mode) {
    let token = group.token();
    match kind {
        TaskKind::RetryErrors => group.spawn(kind.name(), async move {
            workers.retry_errors(token).await;
            Ok(())
        }),
        TaskKind::MessageSubscription => group.spawn(kind.name(), async move {
            workers.message_subscription(token).await;
            Ok(())
        }),
        TaskKind::WorkerMessageSubscription => group.spawn(kind.name(), async move {
            workers.worker_message_subscription(token).await;
            Ok(())
        }),
        TaskKind::LocalRepoWatcher => group.spawn(kind.name(), async move {
            workers.watch_local_repo(token).await
        }),
        TaskKind::ServerWorkerRepoWatcher => group.spawn(kind.name(), async move {
            workers.watch_server_worker_repo(token).await
        }),
        TaskKind::HttpServer => group.spawn(kind.name(), async move {
            workers.run_http_server(mode, token).await
        }),
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received interrupt signal"),
        _ = wait_for_sigterm() => info!("Received terminate signal"),
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to listen for terminate: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
