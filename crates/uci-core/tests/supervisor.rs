//! Supervisor lifecycle tests using recording fake workers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uci_core::{
    plan, Mode, ShutdownPolicy, ShutdownReason, Supervisor, TaskResult, UciError, Workers,
};

#[derive(Default)]
struct FakeWorkers {
    started: Mutex<Vec<String>>,
    http_shutdowns: Mutex<Vec<Duration>>,
    observed_cancel: AtomicUsize,
    fail_watcher: bool,
    stubborn_subscription: bool,
    exit_immediately: bool,
}

impl FakeWorkers {
    fn started(&self) -> Vec<String> {
        let mut started = self.started.lock().unwrap().clone();
        started.sort();
        started
    }

    async fn idle(&self, name: &str, token: CancellationToken) {
        self.started.lock().unwrap().push(name.to_string());
        if self.exit_immediately {
            return;
        }
        token.cancelled().await;
        self.observed_cancel.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Workers for FakeWorkers {
    async fn run_http_server(&self, _mode: Mode, token: CancellationToken) -> TaskResult {
        self.idle("http_server", token).await;
        Ok(())
    }

    async fn shutdown_http_server(&self, deadline: Duration) -> uci_core::Result<()> {
        self.http_shutdowns.lock().unwrap().push(deadline);
        Ok(())
    }

    async fn retry_errors(&self, token: CancellationToken) {
        self.idle("retry_errors", token).await;
    }

    async fn message_subscription(&self, token: CancellationToken) {
        if self.stubborn_subscription {
            self.started
                .lock()
                .unwrap()
                .push("message_subscription".to_string());
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return;
        }
        self.idle("message_subscription", token).await;
    }

    async fn worker_message_subscription(&self, token: CancellationToken) {
        self.idle("worker_message_subscription", token).await;
    }

    async fn watch_local_repo(&self, token: CancellationToken) -> TaskResult {
        if self.fail_watcher {
            self.started
                .lock()
                .unwrap()
                .push("local_repo_watcher".to_string());
            return Err(UciError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "work dir missing",
            )));
        }
        self.idle("local_repo_watcher", token).await;
        Ok(())
    }

    async fn watch_server_worker_repo(&self, token: CancellationToken) -> TaskResult {
        self.idle("server_worker_repo_watcher", token).await;
        Ok(())
    }
}

fn expected_names(mode: Mode, retries: bool) -> Vec<String> {
    let mut names: Vec<String> = plan(mode, retries)
        .iter()
        .map(|k| k.name().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test(start_paused = true)]
async fn signal_triggers_ordered_shutdown() {
    let workers = Arc::new(FakeWorkers::default());
    let supervisor = Supervisor::new(workers.clone(), Mode::Server, true);

    let report = supervisor
        .run(tokio::time::sleep(Duration::from_secs(2)))
        .await;

    assert_eq!(report.reason, ShutdownReason::Signal);
    assert!(report.drained);
    assert_eq!(
        *workers.http_shutdowns.lock().unwrap(),
        vec![Duration::from_secs(60)]
    );
    assert_eq!(workers.started(), expected_names(Mode::Server, true));
    assert_eq!(workers.observed_cancel.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn task_error_cancels_scope() {
    let workers = Arc::new(FakeWorkers {
        fail_watcher: true,
        ..FakeWorkers::default()
    });
    let supervisor = Supervisor::new(workers.clone(), Mode::Local, true);

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        supervisor.run(std::future::pending::<()>()),
    )
    .await
    .expect("supervisor should shut down on task error");

    assert_eq!(report.reason, ShutdownReason::ScopeCancelled);
    assert!(report.drained);
    assert_eq!(workers.http_shutdowns.lock().unwrap().len(), 1);
    // retry_errors, message_subscription, http_server all saw the cancellation
    assert_eq!(workers.observed_cancel.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn stubborn_task_hits_drain_deadline() {
    let workers = Arc::new(FakeWorkers {
        stubborn_subscription: true,
        ..FakeWorkers::default()
    });
    let supervisor = Supervisor::new(workers.clone(), Mode::Local, false);

    let start = tokio::time::Instant::now();
    let report = supervisor
        .run(tokio::time::sleep(Duration::from_secs(2)))
        .await;

    assert_eq!(report.reason, ShutdownReason::Signal);
    assert!(!report.drained);
    assert!(start.elapsed() >= Duration::from_secs(62));
    assert!(start.elapsed() < Duration::from_secs(120));
}

#[tokio::test]
async fn worker_mode_launches_its_plan() {
    let workers = Arc::new(FakeWorkers::default());
    let supervisor = Supervisor::new(workers.clone(), Mode::Worker, true);

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(supervisor.run(async {
        let _ = rx.await;
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();
    let report = handle.await.unwrap();

    assert_eq!(report.reason, ShutdownReason::Signal);
    assert_eq!(workers.started(), expected_names(Mode::Worker, true));
}

#[tokio::test]
async fn all_tasks_returning_ends_steady_state() {
    let workers = Arc::new(FakeWorkers {
        exit_immediately: true,
        ..FakeWorkers::default()
    });
    let supervisor = Supervisor::new(workers.clone(), Mode::Worker, false).with_policy(
        ShutdownPolicy {
            http_deadline: Duration::from_secs(1),
            drain_deadline: Duration::from_secs(1),
        },
    );

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        supervisor.run(std::future::pending::<()>()),
    )
    .await
    .unwrap();

    assert_eq!(report.reason, ShutdownReason::ScopeCancelled);
    assert!(report.drained);
    assert_eq!(
        *workers.http_shutdowns.lock().unwrap(),
        vec![Duration::from_secs(1)]
    );
}
