//! SurrealDB Handle - Connection and Operations
//!
//! `Store::open` connects to a file-backed SurrealKV database at the
//! configured path; `Store::in_memory` connects to `mem://` for tests.

use std::path::Path;

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::schema::{CountRow, RetryRow};
use crate::storage_traits::{RetryRecord, RetryStore};
use crate::Result;

const NAMESPACE: &str = "uci";
const DATABASE: &str = "main";

/// SurrealDB connection handle
#[derive(Clone)]
pub struct Store {
    db: Surreal<Any>,
}

impl Store {
    /// Open (or create) the on-disk store at `path`.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(path).await.map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path.display(),
                e
            ))
        })?;
        let url = format!("surrealkv://{}", path.display());
        info!("Opening store at {}", url);
        Self::connect(&url).await
    }

    /// Connect to SurrealDB in-memory and set up schema
    pub async fn in_memory() -> Result<Self> {
        Self::connect("mem://").await
    }

    async fn connect(url: &str) -> Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Store { db })
    }

    /// Release the connection. Pending writes are already durable once their
    /// query returned.
    pub async fn close(self) -> Result<()> {
        info!("Closing store");
        drop(self.db);
        Ok(())
    }
}

#[async_trait]
impl RetryStore for Store {
    async fn push(&self, record: RetryRecord) -> Result<()> {
        debug!(retry_id = %record.retry_id, attempts = record.attempts, "storing retry record");
        let rid = record.retry_id.clone();
        let row = RetryRow::from(record);

        self.db
            .query("DELETE retry_queue WHERE retry_id = $rid; CREATE retry_queue CONTENT $row")
            .bind(("rid", rid))
            .bind(("row", row))
            .await?
            .check()?;
        Ok(())
    }

    async fn take_all(&self) -> Result<Vec<RetryRecord>> {
        // one statement, so a concurrent push is either drained or kept whole
        let mut res = self.db.query("DELETE retry_queue RETURN BEFORE").await?;
        let mut rows: Vec<RetryRow> = res.take(0)?;
        rows.sort_by_key(|r| r.failed_at);
        Ok(rows.into_iter().map(RetryRecord::from).collect())
    }

    async fn len(&self) -> Result<usize> {
        let mut res = self
            .db
            .query("SELECT count() FROM retry_queue GROUP ALL")
            .await?;
        let rows: Vec<CountRow> = res.take(0)?;
        Ok(rows.first().map(|r| r.count).unwrap_or(0))
    }
}
