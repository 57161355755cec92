//! Database row types and their conversion to storage types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::RetryRecord;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Row in the `retry_queue` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RetryRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub retry_id: String,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub last_error: String,
    #[serde(with = "surreal_datetime")]
    pub failed_at: DateTime<Utc>,
}

impl From<RetryRecord> for RetryRow {
    fn from(record: RetryRecord) -> Self {
        RetryRow {
            id: None,
            retry_id: record.retry_id,
            payload: record.payload,
            attempts: record.attempts,
            last_error: record.last_error,
            failed_at: record.failed_at,
        }
    }
}

impl From<RetryRow> for RetryRecord {
    fn from(row: RetryRow) -> Self {
        RetryRecord {
            retry_id: row.retry_id,
            payload: row.payload,
            attempts: row.attempts,
            last_error: row.last_error,
            failed_at: row.failed_at,
        }
    }
}

/// Result row of a `count()` aggregate
#[derive(Debug, Deserialize)]
pub(crate) struct CountRow {
    pub count: usize,
}
