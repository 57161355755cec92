//! ucid - unified-ci orchestrator daemon
//!
//! Receives pull-request check requests and runs the package vulnerability
//! check for each one. One process runs in exactly one working mode:
//!
//! - `local`: receive, queue and run checks in this process
//! - `server`: receive and queue checks for workers
//! - `worker`: pull checks from a server and run them

mod cli;
mod http;
mod retry;
mod watcher;
mod workers;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use uci_checks::{CheckRunner, GitHubChecksFactory, RikiScanner};
use uci_core::{
    build_client, init_logs, init_message_queue, set_working_mode, shutdown_signal, user_agent,
    working_mode, AppAuth, Config, MessageQueue, Mode, Supervisor,
};
use uci_state::Store;

use crate::cli::{load_config, Dispatch};
use crate::retry::RetryBook;
use crate::workers::{ServiceWorkers, WorkerSettings};

#[tokio::main]
async fn main() -> ExitCode {
    let outcome = cli::dispatch(
        std::env::args_os(),
        &mut std::io::stdout(),
        &mut std::io::stderr(),
    );
    match outcome {
        Dispatch::Exit(code) => ExitCode::from(code),
        Dispatch::Run {
            config,
            mode,
            verbose,
        } => run(&config, mode, verbose).await,
    }
}

/// Startup errors before the log sinks exist go to stderr; later ones go to
/// the error sink.
async fn run(config_path: &Path, mode: Mode, verbose: bool) -> ExitCode {
    let config = match load_config(config_path, verbose) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logs(&config.log) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match serve(Arc::new(config), mode).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: Arc<Config>, mode: Mode) -> Result<()> {
    set_working_mode(mode).context("recording working mode")?;
    info!("Working in {} mode", working_mode().unwrap_or(mode));

    let agent = user_agent();
    let http = build_client(config.core.socks5_proxy(), &agent).context("setup proxy")?;
    let auth = AppAuth::new(
        config.github.app_id,
        &config.github.private_key,
        http.clone(),
        config.github.api_base_url.clone(),
    )
    .context("init github app jwt")?;

    let store = Store::open(&config.core.db_file)
        .await
        .with_context(|| format!("open store at {}", config.core.db_file.display()))?;

    let queue: Option<Arc<dyn MessageQueue>> =
        init_message_queue(mode, config.core.queue_capacity)
            .context("init message queue")?
            .map(|queue| Arc::new(queue) as Arc<dyn MessageQueue>);

    let scanner = RikiScanner::new(
        http,
        config.scanner.base_url.clone(),
        config.scanner.poll_interval(),
        config.scanner.max_polls,
    );
    let runner = CheckRunner::new(
        Arc::new(GitHubChecksFactory::new(Arc::new(auth))),
        Arc::new(scanner),
        config.core.work_dir.clone(),
    );
    let retries = Arc::new(RetryBook::new(
        Arc::new(store.clone()),
        config.core.enable_retries,
        config.core.max_retries,
    ));
    // worker <-> server traffic stays off the provider proxy
    let direct = build_client(None, &agent).context("build worker client")?;

    let workers = ServiceWorkers::new(
        WorkerSettings::from_config(&config),
        queue,
        retries,
        Arc::new(runner),
        direct,
    );

    let report = Supervisor::new(Arc::new(workers), mode, config.core.enable_retries)
        .run(shutdown_signal())
        .await;
    info!(
        reason = report.reason.as_str(),
        drained = report.drained,
        "supervisor stopped"
    );

    store.close().await.context("close store")?;
    Ok(())
}
