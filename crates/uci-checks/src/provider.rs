//! Hosting-provider side of a check: creating and completing check runs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;
use uci_core::github_auth::{GITHUB_ACCEPT, GITHUB_API_VERSION};
use uci_core::AppAuth;

use crate::check_run::{CheckRef, CheckRun, CheckRunUpdate, PullRequest};
use crate::error::{error_for_status, Result};

/// Wire conclusion for a check that could not run to completion.
pub const ERRORED_CONCLUSION: &str = "action_required";

/// Check-run operations the pipeline depends on.
#[async_trait]
pub trait CheckRunClient: Send + Sync {
    /// Create an in-progress check run on `check_ref`.
    async fn create_check_run(
        &self,
        pull: &PullRequest,
        name: &str,
        check_ref: &CheckRef,
        target_url: &str,
    ) -> Result<CheckRun>;

    /// Complete a check run with a conclusion.
    async fn update_check_run(
        &self,
        pull: &PullRequest,
        check_run_id: i64,
        update: &CheckRunUpdate,
    ) -> Result<()>;

    /// Complete a check run as errored, carrying `error` as its text.
    async fn mark_check_run_errored(
        &self,
        pull: &PullRequest,
        check_run_id: i64,
        name: &str,
        summary: &str,
        error: &str,
    ) -> Result<()>;
}

/// Hands out a client bound to one App installation.
pub trait CheckRunClientFactory: Send + Sync {
    fn for_installation(&self, installation_id: u64) -> Arc<dyn CheckRunClient>;
}

/// GitHub Checks API client for one installation.
pub struct GitHubChecks {
    auth: Arc<AppAuth>,
    installation_id: u64,
}

impl GitHubChecks {
    pub fn new(auth: Arc<AppAuth>, installation_id: u64) -> Self {
        Self {
            auth,
            installation_id,
        }
    }

    fn check_runs_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}/check-runs", self.auth.api_base(), owner, repo)
    }

    async fn send(&self, request: reqwest::RequestBuilder, body: &Value) -> Result<reqwest::Response> {
        let token = self.auth.installation_token(self.installation_id).await?;
        let response = request
            .header("Accept", GITHUB_ACCEPT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        error_for_status(response).await
    }

    async fn complete(&self, pull: &PullRequest, check_run_id: i64, body: Value) -> Result<()> {
        let url = format!(
            "{}/{}",
            self.check_runs_url(&pull.owner, &pull.repo),
            check_run_id
        );
        self.send(self.auth.http().patch(url), &body).await?;
        debug!(check_run_id, pull = pull.number, "completed check run");
        Ok(())
    }
}

#[async_trait]
impl CheckRunClient for GitHubChecks {
    async fn create_check_run(
        &self,
        pull: &PullRequest,
        name: &str,
        check_ref: &CheckRef,
        target_url: &str,
    ) -> Result<CheckRun> {
        let mut body = json!({
            "name": name,
            "head_sha": check_ref.head_sha,
            "status": "in_progress",
            "started_at": Utc::now(),
        });
        if !target_url.is_empty() {
            body["details_url"] = json!(target_url);
        }

        let url = self.check_runs_url(&check_ref.owner, &check_ref.repo);
        let response = self.send(self.auth.http().post(url), &body).await?;
        let check_run: CheckRun = response.json().await?;
        debug!(check_run_id = check_run.id, pull = pull.number, name, "created check run");
        Ok(check_run)
    }

    async fn update_check_run(
        &self,
        pull: &PullRequest,
        check_run_id: i64,
        update: &CheckRunUpdate,
    ) -> Result<()> {
        let body = json!({
            "name": update.name,
            "status": "completed",
            "conclusion": update.conclusion,
            "completed_at": update.completed_at,
            "output": {
                "title": update.name,
                "summary": update.summary,
                "text": update.body,
                "annotations": update.annotations,
            },
        });
        self.complete(pull, check_run_id, body).await
    }

    async fn mark_check_run_errored(
        &self,
        pull: &PullRequest,
        check_run_id: i64,
        name: &str,
        summary: &str,
        error: &str,
    ) -> Result<()> {
        let body = json!({
            "name": name,
            "status": "completed",
            "conclusion": ERRORED_CONCLUSION,
            "completed_at": Utc::now(),
            "output": {
                "title": name,
                "summary": summary,
                "text": error,
            },
        });
        self.complete(pull, check_run_id, body).await
    }
}

/// Builds a [`GitHubChecks`] per installation from one shared App identity.
pub struct GitHubChecksFactory {
    auth: Arc<AppAuth>,
}

impl GitHubChecksFactory {
    pub fn new(auth: Arc<AppAuth>) -> Self {
        Self { auth }
    }
}

impl CheckRunClientFactory for GitHubChecksFactory {
    fn for_installation(&self, installation_id: u64) -> Arc<dyn CheckRunClient> {
        Arc::new(GitHubChecks::new(self.auth.clone(), installation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check_run::Conclusion;
    use crate::error::CheckError;
    use mockito::Matcher;
    use uci_core::Secret;

    const TEST_KEY: &str = include_str!("../tests/fixtures/app-key.pem");

    async fn server_with_token() -> mockito::ServerGuard {
        let mut server = mockito::Server::new_async().await;
        let expires = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        server
            .mock("POST", "/app/installations/5/access_tokens")
            .with_status(201)
            .with_body(format!(r#"{{"token": "ghs_test", "expires_at": "{expires}"}}"#))
            .create_async()
            .await;
        server
    }

    fn client(server: &mockito::ServerGuard) -> GitHubChecks {
        let auth = AppAuth::new(
            11,
            &Secret::new(TEST_KEY),
            reqwest::Client::new(),
            server.url(),
        )
        .unwrap();
        GitHubChecks::new(Arc::new(auth), 5)
    }

    fn pull() -> PullRequest {
        PullRequest {
            owner: "acme".to_string(),
            repo: "api".to_string(),
            number: 12,
        }
    }

    fn check_ref() -> CheckRef {
        CheckRef {
            owner: "acme".to_string(),
            repo: "api".to_string(),
            head_sha: "abc123".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_check_run() {
        let mut server = server_with_token().await;
        let mock = server
            .mock("POST", "/repos/acme/api/check-runs")
            .match_header("authorization", "Bearer ghs_test")
            .match_body(Matcher::PartialJson(json!({
                "name": "vulnerability",
                "head_sha": "abc123",
                "status": "in_progress",
                "details_url": "https://ci.example.com/runs/1",
            })))
            .with_status(201)
            .with_body(r#"{"id": 4242, "name": "vulnerability"}"#)
            .create_async()
            .await;

        let run = client(&server)
            .create_check_run(
                &pull(),
                "vulnerability",
                &check_ref(),
                "https://ci.example.com/runs/1",
            )
            .await
            .unwrap();
        assert_eq!(run.id, 4242);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_check_run() {
        let mut server = server_with_token().await;
        let mock = server
            .mock("PATCH", "/repos/acme/api/check-runs/7")
            .match_body(Matcher::PartialJson(json!({
                "status": "completed",
                "conclusion": "success",
                "output": {"summary": "success", "text": "no vulnerabilities"},
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let update = CheckRunUpdate {
            name: "vulnerability".to_string(),
            conclusion: Conclusion::Success,
            completed_at: Utc::now(),
            summary: "success".to_string(),
            body: "no vulnerabilities".to_string(),
            annotations: Vec::new(),
        };
        client(&server)
            .update_check_run(&pull(), 7, &update)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_mark_errored_uses_action_required() {
        let mut server = server_with_token().await;
        let mock = server
            .mock("PATCH", "/repos/acme/api/check-runs/9")
            .match_body(Matcher::PartialJson(json!({
                "conclusion": "action_required",
                "output": {"text": "scanner down"},
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        client(&server)
            .mark_check_run_errored(&pull(), 9, "vulnerability", "vulnerability", "scanner down")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_create_is_status_error() {
        let mut server = server_with_token().await;
        server
            .mock("POST", "/repos/acme/api/check-runs")
            .with_status(422)
            .with_body("Validation Failed")
            .create_async()
            .await;

        let err = client(&server)
            .create_check_run(&pull(), "vulnerability", &check_ref(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, CheckError::Status { status: 422, .. }));
    }
}
