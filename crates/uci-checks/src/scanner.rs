//! Vulnerability scanner client.
//!
//! A scan runs in a [`ScanSession`] bound to one project: manifests are
//! submitted one ecosystem at a time, then the session waits for the
//! scanner to finish processing, then findings are fetched per ecosystem.
//!
//! [`RikiScanner`] talks to a riki service over HTTP:
//!
//! * `PUT  /v1/projects/{project}/manifests/{tag}` uploads a manifest and
//!   answers `{"queryId": ...}`,
//! * `GET  /v1/queries/{id}` answers `{"ready": bool}`,
//! * `GET  /v1/projects/{project}/findings/{tag}` answers a finding list.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::ecosystem::Ecosystem;
use crate::error::{error_for_status, CheckError, Result};
use crate::finding::Finding;

/// Acknowledgement of a submitted manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub ecosystem: Ecosystem,
    pub query_id: String,
}

#[async_trait]
pub trait ScanSession: Send {
    async fn submit_manifest(&mut self, ecosystem: Ecosystem, path: &Path) -> Result<Submission>;

    /// Block until every submission made so far has been processed.
    async fn wait_for_query(&mut self) -> Result<()>;

    async fn fetch(&mut self, ecosystem: Ecosystem) -> Result<Vec<Finding>>;
}

pub trait Scanner: Send + Sync {
    /// Open a session for `project`.
    fn session(&self, project: &str) -> Box<dyn ScanSession>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    query_id: String,
}

#[derive(Debug, Deserialize)]
struct QueryStatus {
    ready: bool,
}

/// riki scanner client.
#[derive(Debug, Clone)]
pub struct RikiScanner {
    http: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl RikiScanner {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval,
            max_polls,
        }
    }
}

impl Scanner for RikiScanner {
    fn session(&self, project: &str) -> Box<dyn ScanSession> {
        Box::new(RikiSession {
            scanner: self.clone(),
            project: project.to_string(),
            pending: Vec::new(),
        })
    }
}

pub struct RikiSession {
    scanner: RikiScanner,
    project: String,
    /// Query ids awaiting readiness, in submission order.
    pending: Vec<String>,
}

impl RikiSession {
    fn project_url(&self, kind: &str, ecosystem: Ecosystem) -> String {
        format!(
            "{}/v1/projects/{}/{}/{}",
            self.scanner.base_url,
            self.project,
            kind,
            ecosystem.tag()
        )
    }

    async fn poll_until_ready(&self, query_id: &str) -> Result<()> {
        let url = format!("{}/v1/queries/{}", self.scanner.base_url, query_id);
        for poll in 1..=self.scanner.max_polls {
            let response = error_for_status(self.scanner.http.get(&url).send().await?).await?;
            let status: QueryStatus = response.json().await?;
            if status.ready {
                debug!(query_id, poll, "scanner query ready");
                return Ok(());
            }
            if poll < self.scanner.max_polls {
                tokio::time::sleep(self.scanner.poll_interval).await;
            }
        }
        warn!(query_id, polls = self.scanner.max_polls, "scanner query never became ready");
        Err(CheckError::QueryTimeout {
            query_id: query_id.to_string(),
            polls: self.scanner.max_polls,
        })
    }
}

#[async_trait]
impl ScanSession for RikiSession {
    async fn submit_manifest(&mut self, ecosystem: Ecosystem, path: &Path) -> Result<Submission> {
        let manifest = tokio::fs::read(path).await?;
        let response = self
            .scanner
            .http
            .put(self.project_url("manifests", ecosystem))
            .header("Content-Type", "application/octet-stream")
            .body(manifest)
            .send()
            .await?;
        let ack: SubmitResponse = error_for_status(response).await?.json().await?;
        debug!(project = %self.project, %ecosystem, query_id = %ack.query_id, "submitted manifest");

        self.pending.push(ack.query_id.clone());
        Ok(Submission {
            ecosystem,
            query_id: ack.query_id,
        })
    }

    async fn wait_for_query(&mut self) -> Result<()> {
        for query_id in &self.pending {
            self.poll_until_ready(query_id).await?;
        }
        self.pending.clear();
        Ok(())
    }

    async fn fetch(&mut self, ecosystem: Ecosystem) -> Result<Vec<Finding>> {
        let response = self
            .scanner
            .http
            .get(self.project_url("findings", ecosystem))
            .send()
            .await?;
        let findings: Vec<Finding> = error_for_status(response).await?.json().await?;
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner(server: &mockito::ServerGuard, max_polls: u32) -> RikiScanner {
        RikiScanner::new(
            reqwest::Client::new(),
            format!("{}/", server.url()),
            Duration::from_millis(1),
            max_polls,
        )
    }

    #[tokio::test]
    async fn test_submit_wait_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("go.sum");
        std::fs::write(&manifest, "golang.org/x/net v0.1.0 h1:abc\n").unwrap();

        let mut server = mockito::Server::new_async().await;
        let submit = server
            .mock("PUT", "/v1/projects/api/manifests/golang")
            .match_body("golang.org/x/net v0.1.0 h1:abc\n")
            .with_status(200)
            .with_body(r#"{"queryId": "q-1"}"#)
            .create_async()
            .await;
        let ready = server
            .mock("GET", "/v1/queries/q-1")
            .with_status(200)
            .with_body(r#"{"ready": true}"#)
            .expect(1)
            .create_async()
            .await;
        let fetch = server
            .mock("GET", "/v1/projects/api/findings/golang")
            .with_status(200)
            .with_body(
                r#"[{"package": "golang.org/x/net", "version": "v0.1.0",
                     "vulnerabilityId": "GO-2023-1571", "severity": "high",
                     "title": "HTTP/2 rapid reset", "fixedVersion": "v0.17.0"}]"#,
            )
            .create_async()
            .await;

        let mut session = scanner(&server, 5).session("api");
        let ack = session
            .submit_manifest(Ecosystem::GoModules, &manifest)
            .await
            .unwrap();
        assert_eq!(ack.query_id, "q-1");

        session.wait_for_query().await.unwrap();

        let findings = session.fetch(Ecosystem::GoModules).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].fixed_version.as_deref(), Some("v0.17.0"));

        submit.assert_async().await;
        ready.assert_async().await;
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn test_wait_gives_up_after_max_polls() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        std::fs::write(&manifest, "{}").unwrap();

        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/v1/projects/web/manifests/nodejs")
            .with_status(200)
            .with_body(r#"{"queryId": "q-9"}"#)
            .create_async()
            .await;
        let polls = server
            .mock("GET", "/v1/queries/q-9")
            .with_status(200)
            .with_body(r#"{"ready": false}"#)
            .expect(3)
            .create_async()
            .await;

        let mut session = scanner(&server, 3).session("web");
        session
            .submit_manifest(Ecosystem::NodeNpm, &manifest)
            .await
            .unwrap();
        let err = session.wait_for_query().await.unwrap_err();
        assert!(matches!(err, CheckError::QueryTimeout { polls: 3, .. }));
        polls.assert_async().await;
    }

    #[tokio::test]
    async fn test_wait_without_submissions_is_noop() {
        let server = mockito::Server::new_async().await;
        let mut session = scanner(&server, 3).session("empty");
        session.wait_for_query().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_submission_is_status_error() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("composer.lock");
        std::fs::write(&manifest, "{}").unwrap();

        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/v1/projects/shop/manifests/php")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = scanner(&server, 3)
            .session("shop")
            .submit_manifest(Ecosystem::PhpComposer, &manifest)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_missing_manifest_is_io_error() {
        let server = mockito::Server::new_async().await;
        let err = scanner(&server, 3)
            .session("x")
            .submit_manifest(Ecosystem::GoModules, Path::new("/nonexistent/go.sum"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckError::Io(_)));
    }
}
