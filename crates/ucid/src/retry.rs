//! Failed check requests awaiting another attempt.
//!
//! Failures are persisted as retry records keyed by delivery id. A retry
//! pass drains the store and republishes every record that still has
//! attempts left. The attempt count travels inside the republished request,
//! so whichever process reports its next failure can increment it.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uci_core::{CheckRequest, MessageQueue};
use uci_state::{RetryRecord, RetryStore, StateError};

/// Outcome of one retry pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryPass {
    pub requeued: usize,
    pub dropped: usize,
}

pub struct RetryBook {
    store: Arc<dyn RetryStore>,
    enabled: bool,
    max_retries: u32,
}

impl RetryBook {
    pub fn new(store: Arc<dyn RetryStore>, enabled: bool, max_retries: u32) -> Self {
        Self {
            store,
            enabled,
            max_retries,
        }
    }

    /// Persist a failed request. A no-op when retries are disabled.
    pub async fn record_failure(
        &self,
        request: &CheckRequest,
        error: &str,
    ) -> Result<(), StateError> {
        if !self.enabled {
            debug!(delivery_id = %request.delivery_id, "retries disabled, not recording failure");
            return Ok(());
        }

        let mut record = RetryRecord::new(
            request.delivery_id.clone(),
            serde_json::to_value(request)?,
            &error,
        );
        record.attempts = request.attempts + 1;
        info!(
            delivery_id = %request.delivery_id,
            attempts = record.attempts,
            "recorded failed check for retry"
        );
        self.store.push(record).await
    }

    /// Republish every stored record with attempts left.
    pub async fn republish(&self, queue: &dyn MessageQueue) -> Result<RetryPass, StateError> {
        let mut pass = RetryPass::default();
        for record in self.store.take_all().await? {
            if record.attempts >= self.max_retries {
                warn!(
                    retry_id = %record.retry_id,
                    attempts = record.attempts,
                    last_error = %record.last_error,
                    "giving up on check request"
                );
                pass.dropped += 1;
                continue;
            }

            let mut request: CheckRequest = match serde_json::from_value(record.payload.clone()) {
                Ok(request) => request,
                Err(e) => {
                    warn!(retry_id = %record.retry_id, "dropping unreadable retry record: {}", e);
                    pass.dropped += 1;
                    continue;
                }
            };
            request.attempts = record.attempts;

            if let Err(e) = queue.publish(request).await {
                warn!(retry_id = %record.retry_id, "requeue failed, keeping record: {}", e);
                self.store.push(record).await?;
                continue;
            }
            pass.requeued += 1;
        }
        Ok(pass)
    }
}
