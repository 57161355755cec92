//! Check pipeline errors.

use uci_core::UciError;

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("scanner error: {0}")]
    Scanner(String),

    #[error("scanner query {query_id} not ready after {polls} polls")]
    QueryTimeout { query_id: String, polls: u32 },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("http request failed: {0}")]
    Http(String),

    #[error("unexpected response status {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Core(#[from] UciError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for CheckError {
    fn from(err: reqwest::Error) -> Self {
        CheckError::Http(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CheckError>;

/// Turn a non-2xx response into `CheckError::Status`.
pub(crate) async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CheckError::Status {
        status: status.as_u16(),
        body,
    })
}
