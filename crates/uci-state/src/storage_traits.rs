//! Storage trait definitions
//!
//! `RetryStore` persists check requests whose run failed so the retry loop
//! can republish them later. The payload is the serialized request; the store
//! never interprets it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// A failed message waiting to be retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryRecord {
    /// Unique record id (the request's delivery id)
    pub retry_id: String,
    /// Serialized message
    pub payload: serde_json::Value,
    /// Number of attempts made so far
    pub attempts: u32,
    /// Error text of the most recent attempt
    pub last_error: String,
    /// When the most recent attempt failed
    pub failed_at: DateTime<Utc>,
}

impl RetryRecord {
    /// Record a first failure for `payload`.
    pub fn new(
        retry_id: impl Into<String>,
        payload: serde_json::Value,
        error: &dyn std::fmt::Display,
    ) -> Self {
        Self {
            retry_id: retry_id.into(),
            payload,
            attempts: 1,
            last_error: error.to_string(),
            failed_at: Utc::now(),
        }
    }
}

/// Durable queue of failed messages.
///
/// Guarantees:
/// - `push` with an existing `retry_id` replaces the earlier record.
/// - `take_all` returns records oldest-failure first and removes them.
#[async_trait]
pub trait RetryStore: Send + Sync {
    /// Insert or replace a record.
    async fn push(&self, record: RetryRecord) -> Result<()>;

    /// Remove and return every stored record.
    async fn take_all(&self) -> Result<Vec<RetryRecord>>;

    /// Number of stored records.
    async fn len(&self) -> Result<usize>;
}
