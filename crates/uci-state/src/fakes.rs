//! In-memory fakes for storage traits (testing only)

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::storage_traits::{RetryRecord, RetryStore};
use crate::Result;

/// In-memory retry store backed by a `HashMap<retry_id, RetryRecord>`.
#[derive(Debug, Default)]
pub struct MemoryRetryStore {
    records: Mutex<HashMap<String, RetryRecord>>,
}

impl MemoryRetryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetryStore for MemoryRetryStore {
    async fn push(&self, record: RetryRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        records.insert(record.retry_id.clone(), record);
        Ok(())
    }

    async fn take_all(&self) -> Result<Vec<RetryRecord>> {
        let mut records = self.records.lock().unwrap();
        let mut all: Vec<RetryRecord> = records.drain().map(|(_, r)| r).collect();
        all.sort_by_key(|r| r.failed_at);
        Ok(all)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.lock().unwrap().len())
    }
}
