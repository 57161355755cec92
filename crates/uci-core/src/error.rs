//! Error taxonomy for the orchestrator core.

use crate::mode::Mode;

/// Core errors. Startup variants are fatal; `Task` is what a supervised task
/// reports when it exits with an error.
#[derive(Debug, thiserror::Error)]
pub enum UciError {
    #[error("failed to load config {path}: {message}")]
    Config { path: String, message: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown working mode: {0}")]
    UnknownMode(String),

    #[error("working mode already set to {0}")]
    ModeAlreadySet(Mode),

    #[error("log setup failed: {0}")]
    Logging(String),

    #[error("setup proxy failed: {0}")]
    Proxy(String),

    #[error("github app auth failed: {0}")]
    Auth(String),

    #[error("http request failed: {0}")]
    Http(String),

    #[error("unexpected response status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("message queue error: {0}")]
    Queue(String),

    #[error("http server error: {0}")]
    Server(String),

    #[error("task {name} failed: {message}")]
    Task { name: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for UciError {
    fn from(err: reqwest::Error) -> Self {
        UciError::Http(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for UciError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        UciError::Auth(err.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, UciError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_display() {
        let err = UciError::Task {
            name: "local_repo_watcher".to_string(),
            message: "work dir vanished".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "task local_repo_watcher failed: work dir vanished"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: UciError = io.into();
        assert!(matches!(err, UciError::Io(_)));
    }
}
