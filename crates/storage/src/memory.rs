//! In-process document store, used for dry runs and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::documents::{DocumentStore, ForecastDocument, StatusDocument, StatusField};
use crate::error::{StoreError, StoreResult};

/// Document store held entirely in memory.
///
/// Clones share the same underlying data. Failures can be injected so
/// callers' retry and escalation paths can be exercised.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    status: Arc<RwLock<Value>>,
    forecasts: Arc<RwLock<BTreeMap<String, ForecastDocument>>>,
    status_faults: Arc<AtomicU32>,
    bulk_faults: Arc<AtomicU32>,
    bulk_calls: Arc<AtomicU32>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    /// A store seeded with an idle status record.
    pub fn new() -> Self {
        Self {
            status: Arc::new(RwLock::new(StatusDocument::initial_json())),
            forecasts: Arc::new(RwLock::new(BTreeMap::new())),
            status_faults: Arc::new(AtomicU32::new(0)),
            bulk_faults: Arc::new(AtomicU32::new(0)),
            bulk_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// A store seeded with the given status record.
    pub fn with_status(status: &StatusDocument) -> StoreResult<Self> {
        let store = Self::new();
        let body =
            serde_json::to_value(status).map_err(|e| StoreError::Serialization(e.to_string()))?;
        *store.status.try_write().map_err(|e| StoreError::Database(e.to_string()))? = body;
        Ok(store)
    }

    /// Make the next `n` status operations fail with a connection error.
    pub fn fail_status_calls(&self, n: u32) {
        self.status_faults.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` bulk upserts fail after writing nothing.
    pub fn fail_bulk_calls(&self, n: u32) {
        self.bulk_faults.store(n, Ordering::SeqCst);
    }

    /// Number of bulk upsert calls received so far.
    pub fn bulk_calls(&self) -> u32 {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored forecast document.
    pub async fn forecasts(&self) -> BTreeMap<String, ForecastDocument> {
        self.forecasts.read().await.clone()
    }

    /// Raw status body as stored.
    pub async fn status_json(&self) -> Value {
        self.status.read().await.clone()
    }

    fn take_fault(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_status_fault(&self) -> StoreResult<()> {
        if Self::take_fault(&self.status_faults) {
            return Err(StoreError::Connection("injected reconnect".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_status(&self) -> StoreResult<StatusDocument> {
        self.check_status_fault()?;
        let body = self.status.read().await.clone();
        serde_json::from_value(body).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn set_status_field(&self, field: &StatusField, value: Value) -> StoreResult<()> {
        self.check_status_fault()?;
        let segments = field.segments();
        let mut body = self.status.write().await;

        let mut node = &mut *body;
        for segment in &segments[..segments.len() - 1] {
            let object = node
                .as_object_mut()
                .ok_or_else(|| StoreError::Database(format!("'{}' is not an object", segment)))?;
            node = object
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }

        let leaf = &segments[segments.len() - 1];
        node.as_object_mut()
            .ok_or_else(|| StoreError::Database(format!("cannot set '{}'", field.path())))?
            .insert(leaf.clone(), value);
        Ok(())
    }

    async fn unset_status_field(&self, field: &StatusField) -> StoreResult<()> {
        self.check_status_fault()?;
        let segments = field.segments();
        let mut body = self.status.write().await;

        let mut node = Some(&mut *body);
        for segment in &segments[..segments.len() - 1] {
            node = node.and_then(|n| n.get_mut(segment.as_str()));
        }
        if let Some(Value::Object(object)) = node {
            object.remove(&segments[segments.len() - 1]);
        }
        Ok(())
    }

    async fn claim_update(&self) -> StoreResult<bool> {
        self.check_status_fault()?;
        let mut body = self.status.write().await;
        let updating = body
            .get("isUpdating")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if updating {
            return Ok(false);
        }
        if let Value::Object(object) = &mut *body {
            object.insert("isUpdating".to_string(), Value::Bool(true));
        }
        Ok(true)
    }

    async fn bulk_upsert_forecasts(&self, docs: &[ForecastDocument]) -> StoreResult<()> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_fault(&self.bulk_faults) {
            return Err(StoreError::BulkWrite {
                failed: docs.len(),
                total: docs.len(),
                first_error: "injected write failure".to_string(),
            });
        }

        let mut forecasts = self.forecasts.write().await;
        for doc in docs {
            forecasts.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn find_forecast(&self, id: &str) -> StoreResult<Option<ForecastDocument>> {
        Ok(self.forecasts.read().await.get(id).cloned())
    }
}
