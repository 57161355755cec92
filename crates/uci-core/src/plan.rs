//! Mode plan: which long-running tasks each working mode launches.

use crate::mode::Mode;

/// A long-running task the supervisor can launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Republishes stored failed messages. Infallible.
    RetryErrors,
    /// Consumes the local queue and runs checks. Infallible.
    MessageSubscription,
    /// Scans the work dir for new working copies (Local mode).
    LocalRepoWatcher,
    /// Scans the work dir for working copies to hand to workers (Server mode).
    ServerWorkerRepoWatcher,
    /// Pulls checks from the server. Infallible.
    WorkerMessageSubscription,
    /// HTTP endpoint; launched in every mode.
    HttpServer,
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::RetryErrors => "retry_errors",
            TaskKind::MessageSubscription => "message_subscription",
            TaskKind::LocalRepoWatcher => "local_repo_watcher",
            TaskKind::ServerWorkerRepoWatcher => "server_worker_repo_watcher",
            TaskKind::WorkerMessageSubscription => "worker_message_subscription",
            TaskKind::HttpServer => "http_server",
        }
    }
}

/// Tasks to launch for `mode`, in launch order. The HTTP server is always last.
pub fn plan(mode: Mode, enable_retries: bool) -> Vec<TaskKind> {
    let mut tasks = Vec::new();
    match mode {
        Mode::Local => {
            if enable_retries {
                tasks.push(TaskKind::RetryErrors);
            }
            tasks.push(TaskKind::MessageSubscription);
            tasks.push(TaskKind::LocalRepoWatcher);
        }
        Mode::Server => {
            if enable_retries {
                tasks.push(TaskKind::RetryErrors);
            }
            tasks.push(TaskKind::ServerWorkerRepoWatcher);
        }
        Mode::Worker => {
            tasks.push(TaskKind::WorkerMessageSubscription);
        }
    }
    tasks.push(TaskKind::HttpServer);
    tasks
}
