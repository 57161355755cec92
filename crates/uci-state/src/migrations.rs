//! SurrealDB schema initialization

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::debug;

/// Define all tables. Safe to call on every open.
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    init_retry_queue_table(db).await
}

/// Initialize `retry_queue` table
///
/// Schema:
/// ```text
/// TABLE retry_queue {
///   retry_id:   STRING (unique)
///   payload:    OBJECT
///   attempts:   INT
///   last_error: STRING
///   failed_at:  DATETIME (indexed)
/// }
/// ```
async fn init_retry_queue_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing retry_queue table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS retry_queue SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_retry_id ON TABLE retry_queue COLUMNS retry_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_failed_at ON TABLE retry_queue COLUMNS failed_at;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;

    Ok(())
}
