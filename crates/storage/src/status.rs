//! Status record access with transient-fault retry.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};
use w4h_common::{retry_async, RetryPolicy};

use crate::documents::{DocumentStore, StatusDocument, StatusField};
use crate::error::{StoreError, StoreResult};

/// Read and point-update the singleton status record.
///
/// Every call goes to the store; reads return explicit snapshots and nothing
/// is cached between calls. Reconnect-class failures are retried under the
/// configured policy (two attempts, no wait, by default).
#[derive(Clone)]
pub struct StatusStore {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
}

impl StatusStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            policy: RetryPolicy::store(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fresh snapshot of the status record.
    pub async fn fetch(&self) -> StoreResult<StatusDocument> {
        retry_async(self.policy, "status.fetch", StoreError::is_transient, || {
            self.store.find_status()
        })
        .await
    }

    #[instrument(skip(self, value), fields(path = %field.path()))]
    pub async fn set_field<V: Serialize>(&self, field: StatusField, value: V) -> StoreResult<()> {
        let value =
            serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        retry_async(self.policy, "status.set", StoreError::is_transient, || {
            self.store.set_status_field(&field, value.clone())
        })
        .await?;
        info!("Status updated");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %field.path()))]
    pub async fn unset_field(&self, field: StatusField) -> StoreResult<()> {
        retry_async(self.policy, "status.unset", StoreError::is_transient, || {
            self.store.unset_status_field(&field)
        })
        .await
    }

    /// Compare-and-set `isUpdating` from false to true.
    pub async fn claim(&self) -> StoreResult<bool> {
        retry_async(self.policy, "status.claim", StoreError::is_transient, || {
            self.store.claim_update()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDocumentStore;

    #[tokio::test]
    async fn test_single_reconnect_is_absorbed() {
        let memory = MemoryDocumentStore::new();
        let status = StatusStore::new(Arc::new(memory.clone()));

        memory.fail_status_calls(1);
        assert!(!status.fetch().await.unwrap().is_updating);
    }

    #[tokio::test]
    async fn test_two_reconnects_exhaust_retries() {
        let memory = MemoryDocumentStore::new();
        let status = StatusStore::new(Arc::new(memory.clone()));

        memory.fail_status_calls(2);
        let err = status
            .set_field(StatusField::IsUpdating, true)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(!status.fetch().await.unwrap().is_updating);
    }

    #[tokio::test]
    async fn test_set_field_serializes_value() {
        let memory = MemoryDocumentStore::new();
        let status = StatusStore::new(Arc::new(memory.clone()));

        status
            .set_field(StatusField::LatestSuccessfulUpdateSource, "gfs20240115/gfs_0p25_1hr_06z")
            .await
            .unwrap();
        assert_eq!(
            status.fetch().await.unwrap().latest_successful_update_source,
            "gfs20240115/gfs_0p25_1hr_06z"
        );
    }
}
