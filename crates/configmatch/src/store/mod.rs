//! Resource store abstraction.
//!
//! The controller never owns state of its own: ConfigMatch objects, sources
//! and targets all live in a [`ResourceStore`]. Implementations must be
//! thread-safe and must emit a [`WatchEvent`] after every successful mutation.

pub mod error;
pub mod index;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::api::{ConfigMatch, DataObject, ObjectKey, SourceKind};

pub use error::StoreError;
pub use index::{index_key, MatchIndex};
pub use memory::MemoryStore;

/// A single label requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelRequirement {
    Equals { key: String, value: String },
    Exists { key: String },
}

impl LabelRequirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            LabelRequirement::Equals { key, value } => labels.get(key) == Some(value),
            LabelRequirement::Exists { key } => labels.contains_key(key),
        }
    }
}

/// Conjunction of label requirements. The empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<LabelRequirement>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.push(LabelRequirement::Equals {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn exists(mut self, key: impl Into<String>) -> Self {
        self.requirements
            .push(LabelRequirement::Exists { key: key.into() });
        self
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl std::fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .requirements
            .iter()
            .map(|r| match r {
                LabelRequirement::Equals { key, value } => format!("{}={}", key, value),
                LabelRequirement::Exists { key } => key.clone(),
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// The type of change carried by a watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// One observed change. `old` is the previous state for modifications and
/// `None` otherwise; for deletions `new` is the last state before removal.
#[derive(Debug, Clone)]
pub struct Change<T> {
    pub change_type: ChangeType,
    pub old: Option<T>,
    pub new: T,
}

impl<T> Change<T> {
    pub fn added(new: T) -> Self {
        Self {
            change_type: ChangeType::Added,
            old: None,
            new,
        }
    }

    pub fn modified(old: T, new: T) -> Self {
        Self {
            change_type: ChangeType::Modified,
            old: Some(old),
            new,
        }
    }

    pub fn deleted(last: T) -> Self {
        Self {
            change_type: ChangeType::Deleted,
            old: None,
            new: last,
        }
    }
}

/// Event emitted by a store after a successful mutation.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Match(Change<ConfigMatch>),
    Object(Change<DataObject>),
}

/// The storage contract the controller is written against.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    // ==================== ConfigMatch ====================

    async fn get_match(&self, key: &ObjectKey) -> Result<Option<ConfigMatch>, StoreError>;

    async fn list_matches(&self) -> Result<Vec<ConfigMatch>, StoreError>;

    /// Secondary-index lookup.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownIndex` for an index the store does not maintain.
    async fn list_matches_by_index(
        &self,
        index: &str,
        value: &str,
    ) -> Result<Vec<ConfigMatch>, StoreError>;

    /// Creates or replaces a ConfigMatch.
    async fn apply_match(&self, spec: ConfigMatch) -> Result<ConfigMatch, StoreError>;

    async fn delete_match(&self, key: &ObjectKey) -> Result<(), StoreError>;

    // ==================== ConfigMap / Secret ====================

    async fn get_object(
        &self,
        kind: SourceKind,
        key: &ObjectKey,
    ) -> Result<Option<DataObject>, StoreError>;

    /// Lists objects of `kind`, optionally restricted to one namespace.
    async fn list_objects(
        &self,
        kind: SourceKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<DataObject>, StoreError>;

    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the object exists.
    async fn create_object(&self, obj: DataObject) -> Result<DataObject, StoreError>;

    /// Replaces an existing object.
    ///
    /// When `obj.metadata.resource_version` is set the write only succeeds if
    /// it still equals the stored version.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the object does not exist.
    /// Returns `StoreError::Conflict` on a resource version mismatch.
    async fn update_object(&self, obj: DataObject) -> Result<DataObject, StoreError>;

    async fn delete_object(&self, kind: SourceKind, key: &ObjectKey) -> Result<(), StoreError>;

    // ==================== Watch ====================

    /// Subscribes to every change made after this call.
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;

    /// Returns the name of this backend for logging.
    fn backend_name(&self) -> &'static str;
}
