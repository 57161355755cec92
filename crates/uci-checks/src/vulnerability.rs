//! Package vulnerability check.
//!
//! Announces a check run, scans every dependency manifest in the working
//! copy, and publishes the findings as a Markdown table. When the first
//! announcement fails the check run is created again once the scan has
//! succeeded, so the verdict is not lost.

use std::io::Write;
use std::path::Path;

use chrono::Utc;
use tracing::{debug, error};

use crate::check_run::{CheckRef, CheckRunUpdate, Conclusion, PullRequest};
use crate::error::Result;
use crate::finding::{render_table, Finding};
use crate::probe;
use crate::provider::CheckRunClient;
use crate::scanner::Scanner;

/// Check-run name.
pub const CHECK_NAME: &str = "vulnerability";

/// Body published when nothing was found.
pub const NO_VULNERABILITIES: &str = "no vulnerabilities";

/// Everything one vulnerability check run needs.
pub struct VulnerabilityInput<'a> {
    pub provider: &'a dyn CheckRunClient,
    pub scanner: &'a dyn Scanner,
    pub pull: &'a PullRequest,
    pub check_ref: &'a CheckRef,
    /// Working copy root.
    pub repo_path: &'a Path,
    pub target_url: &'a str,
}

/// Vulnerability check orchestrator.
pub struct VulnerabilityCheck;

impl VulnerabilityCheck {
    /// Scan the manifests under `repo_path` and collect every finding.
    ///
    /// Ecosystems are submitted in probe order and fetched in the same
    /// order. The scanner is not contacted when no manifest exists.
    pub async fn scan(scanner: &dyn Scanner, project: &str, repo_path: &Path) -> Result<Vec<Finding>> {
        let manifests = probe::discover_manifests(repo_path).await;
        if manifests.is_empty() {
            debug!(project, "no dependency manifests found");
            return Ok(Vec::new());
        }

        let mut session = scanner.session(project);
        let mut submitted = Vec::with_capacity(manifests.len());
        for (ecosystem, path) in manifests {
            session.submit_manifest(ecosystem, &path).await?;
            submitted.push(ecosystem);
        }

        session.wait_for_query().await?;

        let mut findings = Vec::new();
        for ecosystem in submitted {
            findings.extend(session.fetch(ecosystem).await?);
        }
        Ok(findings)
    }

    /// Run the check and return the number of findings.
    ///
    /// Failures are written to `log` as well as the error sink.
    pub async fn run(
        input: VulnerabilityInput<'_>,
        log: &mut (dyn Write + Send),
    ) -> Result<usize> {
        let VulnerabilityInput {
            provider,
            scanner,
            pull,
            check_ref,
            repo_path,
            target_url,
        } = input;

        let check_run_id = match provider
            .create_check_run(pull, CHECK_NAME, check_ref, target_url)
            .await
        {
            Ok(check_run) => Some(check_run.id),
            Err(e) => {
                report(log, &format!("Creating {CHECK_NAME} check run failed: {e}"));
                None
            }
        };

        let findings = match Self::scan(scanner, check_ref.project_name(), repo_path).await {
            Ok(findings) => findings,
            Err(e) => {
                report(log, &format!("checks package vulnerability failed: {e}"));
                if let Some(id) = check_run_id {
                    if let Err(mark_err) = provider
                        .mark_check_run_errored(pull, id, CHECK_NAME, CHECK_NAME, &e.to_string())
                        .await
                    {
                        error!("marking {} check run {} errored failed: {}", CHECK_NAME, id, mark_err);
                    }
                }
                return Err(e);
            }
        };

        let id = match check_run_id {
            Some(id) => id,
            None => match provider
                .create_check_run(pull, CHECK_NAME, check_ref, target_url)
                .await
            {
                Ok(check_run) => check_run.id,
                Err(e) => {
                    report(log, &format!("Creating {CHECK_NAME} check run failed: {e}"));
                    return Err(e);
                }
            },
        };

        let (conclusion, body) = match render_table(&findings) {
            None => (Conclusion::Success, NO_VULNERABILITIES.to_string()),
            Some(table) => (Conclusion::Failure, table),
        };
        let update = CheckRunUpdate {
            name: CHECK_NAME.to_string(),
            conclusion,
            completed_at: Utc::now(),
            summary: conclusion.as_str().to_string(),
            body,
            annotations: Vec::new(),
        };

        if let Err(e) = provider.update_check_run(pull, id, &update).await {
            report(
                log,
                &format!("report package vulnerability to github failed: {e}"),
            );
            return Err(e);
        }
        Ok(findings.len())
    }
}

/// Write `message` to the per-run log and the error sink.
fn report(log: &mut (dyn Write + Send), message: &str) {
    let _ = writeln!(log, "{message}");
    error!("{}", message);
}
