//! Message queue for check requests.
//!
//! Local and Server modes own one in-process FIFO. Producers are the HTTP
//! endpoint, the repository watchers and the retry loop; consumers are the
//! local message subscription (Local) or remote workers pulling through the
//! HTTP endpoint (Server).

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, UciError};
use crate::mode::Mode;

/// One pull-request revision to check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    #[serde(default = "new_delivery_id")]
    pub delivery_id: String,
    pub installation_id: u64,
    pub owner: String,
    pub repo: String,
    pub pull_number: u64,
    pub head_sha: String,
    /// Local path of the working copy.
    #[serde(default)]
    pub repo_path: PathBuf,
    /// Deep link shown on the check run.
    #[serde(default)]
    pub target_url: String,
    /// Failed runs so far; set when a retry republishes the request.
    #[serde(default)]
    pub attempts: u32,
}

/// Fresh random delivery id.
pub fn new_delivery_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl CheckRequest {
    /// `owner/repo`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append a request. Fails when the queue is full.
    async fn publish(&self, request: CheckRequest) -> Result<()>;

    /// Wait for the next request; `None` once `token` is cancelled.
    async fn next(&self, token: &CancellationToken) -> Option<CheckRequest>;

    /// Pop the next request without waiting.
    async fn try_next(&self) -> Option<CheckRequest>;

    async fn len(&self) -> usize;
}

/// Bounded in-process FIFO.
#[derive(Debug)]
pub struct InMemoryQueue {
    items: Mutex<VecDeque<CheckRequest>>,
    notify: Notify,
    capacity: usize,
}

impl InMemoryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
        }
    }

    fn pop(&self) -> Option<CheckRequest> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }
}

/// Build the queue for `mode`; Worker mode has none.
pub fn init_message_queue(mode: Mode, capacity: usize) -> Result<Option<InMemoryQueue>> {
    if !mode.uses_message_queue() {
        return Ok(None);
    }
    if capacity == 0 {
        return Err(UciError::Queue("capacity must be positive".to_string()));
    }
    Ok(Some(InMemoryQueue::new(capacity)))
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn publish(&self, request: CheckRequest) -> Result<()> {
        {
            let mut items = self
                .items
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if items.len() >= self.capacity {
                return Err(UciError::Queue(format!(
                    "queue full ({} pending)",
                    items.len()
                )));
            }
            debug!(delivery_id = %request.delivery_id, repo = %request.full_name(), "queued check request");
            items.push_back(request);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn next(&self, token: &CancellationToken) -> Option<CheckRequest> {
        loop {
            if token.is_cancelled() {
                return None;
            }
            if let Some(request) = self.pop() {
                return Some(request);
            }
            tokio::select! {
                _ = token.cancelled() => return None,
                _ = self.notify.notified() => {}
            }
        }
    }

    async fn try_next(&self) -> Option<CheckRequest> {
        self.pop()
    }

    async fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
pub(crate) fn sample_request(repo: &str) -> CheckRequest {
    CheckRequest {
        delivery_id: new_delivery_id(),
        installation_id: 99,
        owner: "acme".to_string(),
        repo: repo.to_string(),
        pull_number: 1,
        head_sha: "deadbeef".to_string(),
        repo_path: PathBuf::from("/tmp/work"),
        target_url: String::new(),
        attempts: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = InMemoryQueue::new(8);
        queue.publish(sample_request("a")).await.unwrap();
        queue.publish(sample_request("b")).await.unwrap();
        assert_eq!(queue.len().await, 2);

        let token = CancellationToken::new();
        assert_eq!(queue.next(&token).await.unwrap().repo, "a");
        assert_eq!(queue.try_next().await.unwrap().repo, "b");
        assert!(queue.try_next().await.is_none());
    }

    #[tokio::test]
    async fn test_capacity_enforced() {
        let queue = InMemoryQueue::new(1);
        queue.publish(sample_request("a")).await.unwrap();
        let err = queue.publish(sample_request("b")).await.unwrap_err();
        assert!(matches!(err, UciError::Queue(_)));
    }

    #[tokio::test]
    async fn test_next_wakes_on_publish() {
        let queue = Arc::new(InMemoryQueue::new(8));
        let token = CancellationToken::new();

        let consumer = {
            let queue = queue.clone();
            let token = token.clone();
            tokio::spawn(async move { queue.next(&token).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.publish(sample_request("late")).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.unwrap().repo, "late");
    }

    #[tokio::test]
    async fn test_next_returns_none_on_cancel() {
        let queue = InMemoryQueue::new(8);
        let token = CancellationToken::new();
        token.cancel();
        assert!(queue.next(&token).await.is_none());
    }

    #[test]
    fn test_worker_mode_has_no_queue() {
        assert!(init_message_queue(Mode::Worker, 8).unwrap().is_none());
        assert!(init_message_queue(Mode::Local, 8).unwrap().is_some());
        assert!(init_message_queue(Mode::Server, 0).is_err());
    }

    #[test]
    fn test_delivery_id_defaults_when_absent() {
        let body = r#"{"installationId": 1, "owner": "o", "repo": "r", "pullNumber": 3, "headSha": "abc"}"#;
        let request: CheckRequest = serde_json::from_str(body).unwrap();
        assert!(!request.delivery_id.is_empty());
        assert_eq!(request.full_name(), "o/r");
        assert!(request.repo_path.as_os_str().is_empty());
    }
}
