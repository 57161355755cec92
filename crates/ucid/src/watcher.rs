//! Repository watchers.
//!
//! A watcher scans the immediate subdirectories of the work directory for a
//! `check-request.json` descriptor. Each descriptor found is published to
//! the message queue and renamed to `check-request.json.queued` (or removed,
//! when the rename fails), so it is picked up once. Descriptors that cannot
//! be parsed are renamed to `check-request.json.rejected`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uci_core::{CheckRequest, MessageQueue, Result, TaskResult};

pub const DESCRIPTOR: &str = "check-request.json";
const QUEUED_SUFFIX: &str = ".queued";
const REJECTED_SUFFIX: &str = ".rejected";

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// One pass over `work_dir`. Returns the number of requests published.
///
/// Fails only when `work_dir` itself cannot be read.
pub async fn scan_once(work_dir: &Path, queue: &dyn MessageQueue) -> Result<usize> {
    let mut entries = tokio::fs::read_dir(work_dir).await?;
    let mut published = 0;

    while let Some(entry) = entries.next_entry().await? {
        let repo_dir = entry.path();
        let descriptor = repo_dir.join(DESCRIPTOR);
        if !tokio::fs::metadata(&descriptor)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            continue;
        }

        let raw = match tokio::fs::read(&descriptor).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %descriptor.display(), "cannot read check request: {}", e);
                continue;
            }
        };
        let mut request: CheckRequest = match serde_json::from_slice(&raw) {
            Ok(request) => request,
            Err(e) => {
                warn!(path = %descriptor.display(), "rejecting check request: {}", e);
                if let Err(e) =
                    tokio::fs::rename(&descriptor, with_suffix(&descriptor, REJECTED_SUFFIX)).await
                {
                    warn!(path = %descriptor.display(), "cannot reject check request: {}", e);
                }
                continue;
            }
        };
        if request.repo_path.as_os_str().is_empty() {
            request.repo_path = repo_dir.clone();
        }

        let delivery_id = request.delivery_id.clone();
        if let Err(e) = queue.publish(request).await {
            // leave the descriptor for the next pass
            warn!(path = %descriptor.display(), "cannot queue check request: {}", e);
            break;
        }
        published += 1;
        if let Err(e) = tokio::fs::rename(&descriptor, with_suffix(&descriptor, QUEUED_SUFFIX)).await {
            // already queued; make sure the next pass does not queue it again
            warn!(path = %descriptor.display(), "cannot mark check request queued: {}", e);
            if let Err(e) = tokio::fs::remove_file(&descriptor).await {
                warn!(path = %descriptor.display(), "cannot remove queued check request: {}", e);
            }
            continue;
        }
        debug!(%delivery_id, repo = %repo_dir.display(), "queued check request from working copy");
    }
    Ok(published)
}

/// Scan `work_dir` every `interval` until `token` is cancelled.
pub async fn watch(
    name: &str,
    work_dir: &Path,
    interval: Duration,
    queue: &dyn MessageQueue,
    token: CancellationToken,
) -> TaskResult {
    info!(watcher = name, dir = %work_dir.display(), "watching for check requests");
    loop {
        let published = scan_once(work_dir, queue).await?;
        if published > 0 {
            info!(watcher = name, published, "queued check requests");
        }
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uci_core::{InMemoryQueue, UciError};

    const REQUEST: &str = r#"{
        "deliveryId": "d-1",
        "installationId": 5,
        "owner": "acme",
        "repo": "api",
        "pullNumber": 8,
        "headSha": "cafe"
    }"#;

    #[tokio::test]
    async fn test_descriptor_is_queued_once() {
        let work = tempfile::tempdir().unwrap();
        let repo = work.path().join("api");
        std::fs::create_dir(&repo).unwrap();
        std::fs::write(repo.join(DESCRIPTOR), REQUEST).unwrap();
        std::fs::create_dir(work.path().join("idle")).unwrap();

        let queue = InMemoryQueue::new(8);
        assert_eq!(scan_once(work.path(), &queue).await.unwrap(), 1);
        assert_eq!(scan_once(work.path(), &queue).await.unwrap(), 0);

        assert!(repo.join("check-request.json.queued").exists());
        let request = queue.try_next().await.unwrap();
        assert_eq!(request.delivery_id, "d-1");
        assert_eq!(request.repo_path, repo);
    }

    #[tokio::test]
    async fn test_bad_descriptor_is_rejected() {
        let work = tempfile::tempdir().unwrap();
        let repo = work.path().join("broken");
        std::fs::create_dir(&repo).unwrap();
        std::fs::write(repo.join(DESCRIPTOR), "{not json").unwrap();

        let queue = InMemoryQueue::new(8);
        assert_eq!(scan_once(work.path(), &queue).await.unwrap(), 0);
        assert!(repo.join("check-request.json.rejected").exists());
    }

    #[tokio::test]
    async fn test_full_queue_leaves_descriptor() {
        let work = tempfile::tempdir().unwrap();
        let repo = work.path().join("api");
        std::fs::create_dir(&repo).unwrap();
        std::fs::write(repo.join(DESCRIPTOR), REQUEST).unwrap();

        let queue = InMemoryQueue::new(0);
        assert_eq!(scan_once(work.path(), &queue).await.unwrap(), 0);
        assert!(repo.join(DESCRIPTOR).exists());
    }

    #[tokio::test]
    async fn test_unmarkable_descriptor_is_queued_once() {
        let work = tempfile::tempdir().unwrap();
        let repo = work.path().join("api");
        std::fs::create_dir(&repo).unwrap();
        std::fs::write(repo.join(DESCRIPTOR), REQUEST).unwrap();
        // a non-empty directory where the marker should go blocks the rename
        let marker = repo.join("check-request.json.queued");
        std::fs::create_dir(&marker).unwrap();
        std::fs::write(marker.join("keep"), "x").unwrap();

        let queue = InMemoryQueue::new(8);
        assert_eq!(scan_once(work.path(), &queue).await.unwrap(), 1);
        assert_eq!(scan_once(work.path(), &queue).await.unwrap(), 0);
        assert_eq!(queue.len().await, 1);
        assert!(!repo.join(DESCRIPTOR).exists());
    }

    #[tokio::test]
    async fn test_missing_work_dir_is_terminal() {
        let queue = InMemoryQueue::new(8);
        let token = CancellationToken::new();
        let err = watch(
            "local_repo_watcher",
            Path::new("/nonexistent/work"),
            Duration::from_secs(1),
            &queue,
            token,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UciError::Io(_)));
    }

    #[tokio::test]
    async fn test_watch_returns_on_cancel() {
        let work = tempfile::tempdir().unwrap();
        let queue = InMemoryQueue::new(8);
        let token = CancellationToken::new();
        token.cancel();
        watch(
            "local_repo_watcher",
            work.path(),
            Duration::from_secs(3600),
            &queue,
            token,
        )
        .await
        .unwrap();
    }
}
