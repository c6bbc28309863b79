//! In-memory resource store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::error::StoreError;
use super::index::MatchIndex;
use super::{Change, LabelSelector, ResourceStore, WatchEvent};
use crate::api::{
    ConfigMatch, DataObject, Manifest, ObjectKey, ObjectMeta, ResourceKind, SourceKind,
    MATCH_GROUP_INDEX,
};

/// Default capacity of the watch channel.
pub const DEFAULT_WATCH_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct Inner {
    matches: BTreeMap<ObjectKey, ConfigMatch>,
    match_index: MatchIndex,
    /// Keyed by kind first so listing one kind walks a contiguous range in
    /// `(namespace, name)` order.
    objects: BTreeMap<(SourceKind, ObjectKey), DataObject>,
}

/// In-memory [`ResourceStore`].
///
/// This store provides:
/// - Compare-and-swap updates on a monotonically increasing resource version
/// - The `.metadata.matchLabel` secondary index over ConfigMatch objects
/// - A broadcast watch channel fed after each successful mutation
/// - Deterministic listing order (`namespace`, then `name`)
///
/// Creation timestamps already present on a created object are kept, which
/// lets fixtures control recency.
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    version_counter: AtomicU64,
    sender: broadcast::Sender<WatchEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_watch_capacity(DEFAULT_WATCH_CAPACITY)
    }

    pub fn with_watch_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: RwLock::new(Inner::default()),
            version_counter: AtomicU64::new(1),
            sender,
        }
    }

    fn next_version(&self) -> String {
        self.version_counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }

    /// Fills in the fields the store owns on creation.
    fn stamp_new(&self, meta: &mut ObjectMeta) {
        if meta.uid.is_empty() {
            meta.uid = uuid::Uuid::new_v4().to_string();
        }
        if meta.creation_timestamp.is_none() {
            meta.creation_timestamp = Some(Utc::now());
        }
        meta.resource_version = self.next_version();
    }

    /// Carries store-owned fields over from the stored object on update.
    fn stamp_update(&self, meta: &mut ObjectMeta, current: &ObjectMeta) {
        meta.uid = current.uid.clone();
        meta.creation_timestamp = current.creation_timestamp;
        meta.resource_version = self.next_version();
    }

    fn emit(&self, event: WatchEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Applies parsed manifests: ConfigMatch objects are applied, data
    /// objects are created or replaced unconditionally.
    pub async fn apply_manifests(
        &self,
        manifests: impl IntoIterator<Item = Manifest>,
    ) -> Result<(), StoreError> {
        for manifest in manifests {
            match manifest {
                Manifest::ConfigMatch(spec) => {
                    self.apply_match(spec).await?;
                }
                Manifest::Object(obj) => {
                    let existing = self.get_object(obj.kind, &obj.key()).await?;
                    if existing.is_some() {
                        let mut obj = obj;
                        obj.metadata.resource_version.clear();
                        self.update_object(obj).await?;
                    } else {
                        self.create_object(obj).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get_match(&self, key: &ObjectKey) -> Result<Option<ConfigMatch>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.matches.get(key).cloned())
    }

    async fn list_matches(&self) -> Result<Vec<ConfigMatch>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.matches.values().cloned().collect())
    }

    async fn list_matches_by_index(
        &self,
        index: &str,
        value: &str,
    ) -> Result<Vec<ConfigMatch>, StoreError> {
        if index != MATCH_GROUP_INDEX {
            return Err(StoreError::UnknownIndex(index.to_string()));
        }
        let inner = self.inner.read().await;
        Ok(inner
            .match_index
            .lookup(value)
            .iter()
            .filter_map(|key| inner.matches.get(key).cloned())
            .collect())
    }

    async fn apply_match(&self, mut spec: ConfigMatch) -> Result<ConfigMatch, StoreError> {
        let mut inner = self.inner.write().await;
        let key = spec.key();

        let previous = inner.matches.get(&key).cloned();
        match &previous {
            Some(current) => self.stamp_update(&mut spec.metadata, &current.metadata),
            None => self.stamp_new(&mut spec.metadata),
        }

        inner.match_index.insert(&spec);
        inner.matches.insert(key.clone(), spec.clone());
        debug!(key = %key, resource_version = %spec.metadata.resource_version, "Applied ConfigMatch");

        self.emit(WatchEvent::Match(match previous {
            Some(old) => Change::modified(old, spec.clone()),
            None => Change::added(spec.clone()),
        }));
        Ok(spec)
    }

    async fn delete_match(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let removed = inner
            .matches
            .remove(key)
            .ok_or_else(|| StoreError::not_found(ResourceKind::ConfigMatch, key))?;
        inner.match_index.remove(key);

        self.emit(WatchEvent::Match(Change::deleted(removed)));
        Ok(())
    }

    async fn get_object(
        &self,
        kind: SourceKind,
        key: &ObjectKey,
    ) -> Result<Option<DataObject>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.objects.get(&(kind, key.clone())).cloned())
    }

    async fn list_objects(
        &self,
        kind: SourceKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<DataObject>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .objects
            .iter()
            .filter(|((k, key), _)| *k == kind && namespace.map_or(true, |ns| key.namespace == ns))
            .filter(|(_, obj)| selector.matches(&obj.metadata.labels))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create_object(&self, mut obj: DataObject) -> Result<DataObject, StoreError> {
        let mut inner = self.inner.write().await;
        let slot = (obj.kind, obj.key());
        if inner.objects.contains_key(&slot) {
            return Err(StoreError::already_exists(obj.kind, &slot.1));
        }

        self.stamp_new(&mut obj.metadata);
        inner.objects.insert(slot, obj.clone());
        debug!(kind = %obj.kind, key = %obj.key(), "Created object");

        self.emit(WatchEvent::Object(Change::added(obj.clone())));
        Ok(obj)
    }

    async fn update_object(&self, mut obj: DataObject) -> Result<DataObject, StoreError> {
        let mut inner = self.inner.write().await;
        let slot = (obj.kind, obj.key());
        let current = inner
            .objects
            .get(&slot)
            .cloned()
            .ok_or_else(|| StoreError::not_found(obj.kind, &slot.1))?;

        let expected = &obj.metadata.resource_version;
        if !expected.is_empty() && *expected != current.metadata.resource_version {
            return Err(StoreError::conflict(
                obj.kind,
                &slot.1,
                expected.clone(),
                current.metadata.resource_version.clone(),
            ));
        }

        self.stamp_update(&mut obj.metadata, &current.metadata);
        inner.objects.insert(slot, obj.clone());
        debug!(
            kind = %obj.kind,
            key = %obj.key(),
            resource_version = %obj.metadata.resource_version,
            "Updated object"
        );

        self.emit(WatchEvent::Object(Change::modified(current, obj.clone())));
        Ok(obj)
    }

    async fn delete_object(&self, kind: SourceKind, key: &ObjectKey) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let removed = inner
            .objects
            .remove(&(kind, key.clone()))
            .ok_or_else(|| StoreError::not_found(kind, key))?;

        self.emit(WatchEvent::Object(Change::deleted(removed)));
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
