//! Test harness for isolated reconciliation tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use configmatch::api::{ConfigMatch, DataObject, ObjectKey, SourceKind};
use configmatch::controller::{ReconcileError, ReconcileOutcome, Reconciler, RetryPolicy};
use configmatch::store::{LabelSelector, MemoryStore, ResourceStore, StoreError, WatchEvent};

use super::builders::NAMESPACE;

/// In-memory store plus a reconciler bound to it.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub reconciler: Reconciler,
}

impl TestHarness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone()).with_retry_policy(fast_retry(5));
        Self { store, reconciler }
    }

    pub async fn apply(&self, spec: ConfigMatch) -> ConfigMatch {
        self.store.apply_match(spec).await.unwrap()
    }

    pub async fn create(&self, obj: DataObject) -> DataObject {
        self.store.create_object(obj).await.unwrap()
    }

    pub async fn reconcile(&self, name: &str) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconciler
            .reconcile(&ObjectKey::new(NAMESPACE, name))
            .await
    }

    pub async fn object(&self, kind: SourceKind, name: &str) -> Option<DataObject> {
        self.store
            .get_object(kind, &ObjectKey::new(NAMESPACE, name))
            .await
            .unwrap()
    }

    pub fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.store.watch()
    }
}

/// Retry policy without meaningful sleeps.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
    }
}

/// Counts the events already waiting in `rx`.
pub fn drain_events(rx: &mut broadcast::Receiver<WatchEvent>) -> usize {
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    count
}

/// Wraps a `MemoryStore` and fails the next `n` object writes with a
/// conflict, as if another writer got there first. Object listings can be
/// made to fail with an internal error as well.
pub struct FlakyStore {
    pub inner: MemoryStore,
    conflicts: AtomicU32,
    list_failures: AtomicU32,
    pub write_attempts: AtomicU32,
}

impl FlakyStore {
    pub fn new(conflicts: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            conflicts: AtomicU32::new(conflicts),
            list_failures: AtomicU32::new(0),
            write_attempts: AtomicU32::new(0),
        }
    }

    /// Fails the next `n` object listings with `StoreError::Internal`.
    pub fn with_list_failures(self, n: u32) -> Self {
        self.list_failures.store(n, Ordering::SeqCst);
        self
    }

    fn take_conflict(&self) -> bool {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        self.conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ResourceStore for FlakyStore {
    async fn get_match(&self, key: &ObjectKey) -> Result<Option<ConfigMatch>, StoreError> {
        self.inner.get_match(key).await
    }

    async fn list_matches(&self) -> Result<Vec<ConfigMatch>, StoreError> {
        self.inner.list_matches().await
    }

    async fn list_matches_by_index(
        &self,
        index: &str,
        value: &str,
    ) -> Result<Vec<ConfigMatch>, StoreError> {
        self.inner.list_matches_by_index(index, value).await
    }

    async fn apply_match(&self, spec: ConfigMatch) -> Result<ConfigMatch, StoreError> {
        self.inner.apply_match(spec).await
    }

    async fn delete_match(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.inner.delete_match(key).await
    }

    async fn get_object(
        &self,
        kind: SourceKind,
        key: &ObjectKey,
    ) -> Result<Option<DataObject>, StoreError> {
        self.inner.get_object(kind, key).await
    }

    async fn list_objects(
        &self,
        kind: SourceKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<DataObject>, StoreError> {
        if self
            .list_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Internal("listing failed".to_string()));
        }
        self.inner.list_objects(kind, namespace, selector).await
    }

    async fn create_object(&self, obj: DataObject) -> Result<DataObject, StoreError> {
        if self.take_conflict() {
            return Err(StoreError::already_exists(obj.kind, obj.key()));
        }
        self.inner.create_object(obj).await
    }

    async fn update_object(&self, obj: DataObject) -> Result<DataObject, StoreError> {
        if self.take_conflict() {
            return Err(StoreError::conflict(
                obj.kind,
                obj.key(),
                obj.metadata.resource_version.clone(),
                "concurrent",
            ));
        }
        self.inner.update_object(obj).await
    }

    async fn delete_object(&self, kind: SourceKind, key: &ObjectKey) -> Result<(), StoreError> {
        self.inner.delete_object(kind, key).await
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.inner.watch()
    }

    fn backend_name(&self) -> &'static str {
        "flaky-memory"
    }
}
