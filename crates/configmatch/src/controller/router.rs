//! Routes watch events to the ConfigMatch identities they affect.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use super::pattern::{self, CompiledPattern};
use super::predicate;
use crate::api::{ConfigMatch, ObjectKey, SourceObject, MATCH_GROUP_INDEX};
use crate::store::{ChangeType, ResourceStore, StoreError, WatchEvent};

/// Request to reconcile one ConfigMatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ReconcileRequest {
    pub key: ObjectKey,
}

impl ReconcileRequest {
    pub fn new(key: ObjectKey) -> Self {
        Self { key }
    }
}

impl std::fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.key.fmt(f)
    }
}

/// A compiled pattern together with the source it was compiled from, so a
/// changed ConfigMatch pattern is noticed on the next lookup.
#[derive(Debug)]
struct CachedPattern {
    source: String,
    /// `None` for patterns that do not compile.
    compiled: Option<CompiledPattern>,
}

/// Maps source changes to ConfigMatch identities.
///
/// Candidates come from the store's match-group index
/// ([`MATCH_GROUP_INDEX`]); the router only keeps their compiled patterns.
/// It prunes by group label and pattern; the reconciler makes the
/// authoritative decision.
pub struct EventRouter {
    store: Arc<dyn ResourceStore>,
    patterns: RwLock<HashMap<ObjectKey, CachedPattern>>,
}

impl EventRouter {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            patterns: RwLock::new(HashMap::new()),
        }
    }

    fn read_patterns(&self) -> RwLockReadGuard<'_, HashMap<ObjectKey, CachedPattern>> {
        match self.patterns.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Router pattern cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_patterns(&self) -> RwLockWriteGuard<'_, HashMap<ObjectKey, CachedPattern>> {
        match self.patterns.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Router pattern cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Drops the cached pattern of a deleted or unlabeled ConfigMatch.
    pub fn forget_match(&self, key: &ObjectKey) {
        self.write_patterns().remove(key);
    }

    /// Drops every cached pattern.
    pub fn clear(&self) {
        self.write_patterns().clear();
    }

    /// Number of cached patterns.
    pub fn len(&self) -> usize {
        self.read_patterns().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `spec`'s pattern matches `name`, compiling and caching it
    /// on first use.
    fn pattern_matches(&self, spec: &ConfigMatch, name: &str) -> bool {
        let key = spec.key();
        let source = &spec.spec.source_ref.pattern;
        {
            let cache = self.read_patterns();
            if let Some(cached) = cache.get(&key).filter(|c| &c.source == source) {
                return cached.compiled.as_ref().is_some_and(|p| p.matches(name));
            }
        }

        let compiled = match pattern::compile(source) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                log::debug!("Not routing sources to {}: {}", key, e);
                None
            }
        };
        let matched = compiled.as_ref().is_some_and(|p| p.matches(name));
        self.write_patterns().insert(
            key,
            CachedPattern {
                source: source.clone(),
                compiled,
            },
        );
        matched
    }

    /// Resolves the ConfigMatch objects affected by a changed source.
    ///
    /// Sources without a group label produce nothing, as do candidates
    /// without the group label themselves. Candidates are not filtered by
    /// kind.
    pub async fn on_source_changed<S: SourceObject + ?Sized>(
        &self,
        obj: &S,
    ) -> Result<Vec<ReconcileRequest>, StoreError> {
        let Some(group) = obj.group_label() else {
            return Ok(Vec::new());
        };

        let candidates = self
            .store
            .list_matches_by_index(MATCH_GROUP_INDEX, group)
            .await?;

        let requests: BTreeSet<ReconcileRequest> = candidates
            .iter()
            .filter(|spec| predicate::has_group_label(&spec.metadata))
            .filter(|spec| self.pattern_matches(spec, obj.name()))
            .map(|spec| ReconcileRequest::new(spec.key()))
            .collect();

        Ok(requests.into_iter().collect())
    }

    /// A ConfigMatch event routes to the ConfigMatch itself, if it carries
    /// the group label.
    pub fn on_match_changed(&self, spec: &ConfigMatch) -> Vec<ReconcileRequest> {
        if !predicate::has_group_label(&spec.metadata) {
            return Vec::new();
        }
        vec![ReconcileRequest::new(spec.key())]
    }

    /// Applies a watch event: keeps the pattern cache current, runs the
    /// predicates and returns the requests to enqueue.
    pub async fn on_event(&self, event: &WatchEvent) -> Result<Vec<ReconcileRequest>, StoreError> {
        match event {
            WatchEvent::Match(change) => {
                if change.change_type == ChangeType::Deleted
                    || !predicate::has_group_label(&change.new.metadata)
                {
                    self.forget_match(&change.new.key());
                }
                if predicate::admit_match_change(change) {
                    Ok(self.on_match_changed(&change.new))
                } else {
                    Ok(Vec::new())
                }
            }
            WatchEvent::Object(change) => {
                if predicate::admit_object_change(change) {
                    self.on_source_changed(&change.new).await
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        ConfigMatchSpec, DataObject, ObjectMeta, Payload, SourceKind, SourceRef, Target,
        GROUP_LABEL,
    };
    use crate::store::{Change, MemoryStore};

    fn config_match(name: &str, pattern: &str, group: &str, kind: SourceKind) -> ConfigMatch {
        ConfigMatch::config_match(
            ObjectMeta::new("default", name).with_label(GROUP_LABEL, group),
            ConfigMatchSpec {
                source_ref: SourceRef {
                    kind,
                    pattern: pattern.to_string(),
                    namespace: String::new(),
                    match_group: group.to_string(),
                },
                target: Target {
                    kind,
                    name: format!("{}-out", name),
                    namespace: String::new(),
                },
            },
        )
    }

    fn source(kind: SourceKind, name: &str, group: Option<&str>) -> DataObject {
        let mut meta = ObjectMeta::new("default", name);
        if let Some(group) = group {
            meta = meta.with_label(GROUP_LABEL, group);
        }
        DataObject::new(kind, meta).with_data(Payload::new())
    }

    fn keys(requests: &[ReconcileRequest]) -> Vec<String> {
        requests.iter().map(|r| r.key.name.clone()).collect()
    }

    async fn router_with(specs: Vec<ConfigMatch>) -> (Arc<MemoryStore>, EventRouter) {
        let store = Arc::new(MemoryStore::new());
        for spec in specs {
            store.apply_match(spec).await.unwrap();
        }
        let router = EventRouter::new(store.clone());
        (store, router)
    }

    async fn router() -> (Arc<MemoryStore>, EventRouter) {
        router_with(vec![
            config_match("cfg", r"^cfg-\d+$", "g1", SourceKind::ConfigMap),
            config_match("any", ".*", "g1", SourceKind::Secret),
            config_match("other", ".*", "g2", SourceKind::ConfigMap),
            config_match("broken", "[", "g1", SourceKind::ConfigMap),
        ])
        .await
    }

    #[tokio::test]
    async fn test_routes_by_group_and_pattern() {
        let (_store, router) = router().await;
        let requests = router
            .on_source_changed(&source(SourceKind::ConfigMap, "cfg-1", Some("g1")))
            .await
            .unwrap();
        assert_eq!(keys(&requests), vec!["any", "cfg"]);

        let requests = router
            .on_source_changed(&source(SourceKind::ConfigMap, "misc", Some("g1")))
            .await
            .unwrap();
        assert_eq!(keys(&requests), vec!["any"]);
    }

    #[tokio::test]
    async fn test_does_not_prune_by_kind() {
        let (_store, router) = router().await;
        // "cfg" selects ConfigMaps but is still routed for a matching Secret.
        let requests = router
            .on_source_changed(&source(SourceKind::Secret, "cfg-7", Some("g1")))
            .await
            .unwrap();
        assert_eq!(keys(&requests), vec!["any", "cfg"]);
    }

    #[tokio::test]
    async fn test_unlabeled_source_routes_nowhere() {
        let (_store, router) = router().await;
        for name in ["cfg-1", "misc", ""] {
            assert!(router
                .on_source_changed(&source(SourceKind::ConfigMap, name, None))
                .await
                .unwrap()
                .is_empty());
        }
    }

    #[tokio::test]
    async fn test_unknown_group_routes_nowhere() {
        let (_store, router) = router().await;
        assert!(router
            .on_source_changed(&source(SourceKind::ConfigMap, "cfg-1", Some("g9")))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unlabeled_match_is_never_routed() {
        let mut unlabeled = config_match("unlabeled", ".*", "g1", SourceKind::ConfigMap);
        unlabeled.metadata.labels.clear();
        let (_store, router) = router_with(vec![unlabeled.clone()]).await;

        assert!(router.on_match_changed(&unlabeled).is_empty());
        let requests = router
            .on_source_changed(&source(SourceKind::ConfigMap, "cfg-1", Some("g1")))
            .await
            .unwrap();
        assert!(requests.is_empty(), "routed to {:?}", requests);
        assert!(router.is_empty());
    }

    #[tokio::test]
    async fn test_match_losing_label_stops_routing() {
        let spec = config_match("m", ".*", "g1", SourceKind::ConfigMap);
        let (store, router) = router_with(vec![spec.clone()]).await;
        let src = source(SourceKind::ConfigMap, "x", Some("g1"));
        assert_eq!(keys(&router.on_source_changed(&src).await.unwrap()), vec!["m"]);
        assert_eq!(router.len(), 1);

        let mut unlabeled = store.get_match(&spec.key()).await.unwrap().unwrap();
        unlabeled.metadata.labels.clear();
        let updated = store.apply_match(unlabeled).await.unwrap();

        let requests = router
            .on_event(&WatchEvent::Match(Change::modified(spec, updated)))
            .await
            .unwrap();
        assert!(requests.is_empty());
        assert!(router.is_empty());
        assert!(router.on_source_changed(&src).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_match_events_route_to_self_when_labeled() {
        let (_store, router) = router_with(Vec::new()).await;
        let labeled = config_match("m", ".*", "g1", SourceKind::ConfigMap);
        assert_eq!(keys(&router.on_match_changed(&labeled)), vec!["m"]);

        let mut unlabeled = labeled.clone();
        unlabeled.metadata.labels.clear();
        assert!(router.on_match_changed(&unlabeled).is_empty());
    }

    #[tokio::test]
    async fn test_on_event_filters_and_forgets() {
        let spec = config_match("m", ".*", "g1", SourceKind::ConfigMap);
        let (store, router) = router_with(vec![spec.clone()]).await;

        let requests = router
            .on_event(&WatchEvent::Match(Change::added(spec.clone())))
            .await
            .unwrap();
        assert_eq!(keys(&requests), vec!["m"]);

        let src = source(SourceKind::ConfigMap, "x", Some("g1"));
        let requests = router
            .on_event(&WatchEvent::Object(Change::added(src.clone())))
            .await
            .unwrap();
        assert_eq!(keys(&requests), vec!["m"]);
        assert_eq!(router.len(), 1);

        // Metadata-only update is filtered out.
        let requests = router
            .on_event(&WatchEvent::Object(Change::modified(src.clone(), src)))
            .await
            .unwrap();
        assert!(requests.is_empty());

        store.delete_match(&spec.key()).await.unwrap();
        router
            .on_event(&WatchEvent::Match(Change::deleted(spec)))
            .await
            .unwrap();
        assert!(router.is_empty());
    }

    #[tokio::test]
    async fn test_changed_pattern_is_recompiled() {
        let spec = config_match("m", "^a-", "g1", SourceKind::ConfigMap);
        let (store, router) = router_with(vec![spec.clone()]).await;
        let b = source(SourceKind::ConfigMap, "b-1", Some("g1"));
        assert!(router.on_source_changed(&b).await.unwrap().is_empty());

        let mut changed = store.get_match(&spec.key()).await.unwrap().unwrap();
        changed.spec.source_ref.pattern = "^b-".to_string();
        store.apply_match(changed).await.unwrap();

        assert_eq!(keys(&router.on_source_changed(&b).await.unwrap()), vec!["m"]);
    }
}
