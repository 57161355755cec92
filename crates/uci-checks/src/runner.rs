//! Turns a queued check request into a vulnerability check run.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{warn, Instrument};
use uci_core::{obs, CheckRequest};

use crate::check_run::{CheckRef, PullRequest};
use crate::error::Result;
use crate::provider::CheckRunClientFactory;
use crate::scanner::Scanner;
use crate::vulnerability::{VulnerabilityCheck, VulnerabilityInput, CHECK_NAME};

/// Runs checks for check requests.
pub struct CheckRunner {
    providers: Arc<dyn CheckRunClientFactory>,
    scanner: Arc<dyn Scanner>,
    work_dir: PathBuf,
}

impl CheckRunner {
    pub fn new(
        providers: Arc<dyn CheckRunClientFactory>,
        scanner: Arc<dyn Scanner>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            providers,
            scanner,
            work_dir: work_dir.into(),
        }
    }

    /// `<work_dir>/logs/<delivery id>.log`
    pub fn log_path(&self, delivery_id: &str) -> PathBuf {
        let file_name: String = delivery_id
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect();
        self.work_dir.join("logs").join(format!("{file_name}.log"))
    }

    /// Working copy for `request`; `<work_dir>/<repo>` when none was given.
    pub fn repo_path(&self, request: &CheckRequest) -> PathBuf {
        if request.repo_path.as_os_str().is_empty() {
            self.work_dir.join(&request.repo)
        } else {
            request.repo_path.clone()
        }
    }

    /// Run every check for `request` and return the number of findings.
    pub async fn run(&self, request: &CheckRequest) -> Result<usize> {
        let span = obs::check_span(&request.delivery_id, &request.full_name());
        self.run_checks(request).instrument(span).await
    }

    async fn run_checks(&self, request: &CheckRequest) -> Result<usize> {
        let repo = request.full_name();
        obs::emit_check_started(CHECK_NAME, &repo);

        let mut log = Vec::new();
        let _ = writeln!(
            log,
            "{} #{} at {}",
            repo, request.pull_number, request.head_sha
        );

        let provider = self.providers.for_installation(request.installation_id);
        let pull = PullRequest {
            owner: request.owner.clone(),
            repo: request.repo.clone(),
            number: request.pull_number,
        };
        let check_ref = CheckRef {
            owner: request.owner.clone(),
            repo: request.repo.clone(),
            head_sha: request.head_sha.clone(),
        };
        let repo_path = self.repo_path(request);

        let input = VulnerabilityInput {
            provider: provider.as_ref(),
            scanner: self.scanner.as_ref(),
            pull: &pull,
            check_ref: &check_ref,
            repo_path: &repo_path,
            target_url: &request.target_url,
        };
        let outcome = VulnerabilityCheck::run(input, &mut log).await;
        if let Ok(findings) = &outcome {
            let _ = writeln!(log, "{CHECK_NAME}: {findings} finding(s)");
        }

        if let Err(e) = self.append_log(&request.delivery_id, &log).await {
            warn!(delivery_id = %request.delivery_id, "cannot write check log: {}", e);
        }
        let findings = outcome?;
        obs::emit_check_finished(CHECK_NAME, &repo, findings);
        Ok(findings)
    }

    async fn append_log(&self, delivery_id: &str, contents: &[u8]) -> std::io::Result<()> {
        let path = self.log_path(delivery_id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(contents).await?;
        file.flush().await
    }
}
