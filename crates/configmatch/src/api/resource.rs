//! K8s-style resource types for the configmatch controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The API version for ConfigMatch resources.
pub const API_VERSION: &str = "util.phoban.io/v1alpha1";

/// The API version of the core data kinds (ConfigMap, Secret).
pub const CORE_API_VERSION: &str = "v1";

/// Label that places an object into a match group.
pub const GROUP_LABEL: &str = "config.matcher.io/group";

/// Name of the secondary index over ConfigMatch match groups.
pub const MATCH_GROUP_INDEX: &str = ".metadata.matchLabel";

/// Opaque key-value payload carried by ConfigMaps and Secrets.
pub type Payload = BTreeMap<String, Vec<u8>>;

/// Every kind the controller knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    ConfigMatch,
    ConfigMap,
    Secret,
}

impl ResourceKind {
    /// Returns the apiVersion objects of this kind are served under.
    pub fn api_version(&self) -> &'static str {
        match self {
            ResourceKind::ConfigMatch => API_VERSION,
            ResourceKind::ConfigMap | ResourceKind::Secret => CORE_API_VERSION,
        }
    }

    /// Returns all resource kinds.
    pub fn all() -> &'static [ResourceKind] {
        &[
            ResourceKind::ConfigMatch,
            ResourceKind::ConfigMap,
            ResourceKind::Secret,
        ]
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::ConfigMatch => write!(f, "ConfigMatch"),
            ResourceKind::ConfigMap => write!(f, "ConfigMap"),
            ResourceKind::Secret => write!(f, "Secret"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "configmatch" => Ok(ResourceKind::ConfigMatch),
            "configmap" => Ok(ResourceKind::ConfigMap),
            "secret" => Ok(ResourceKind::Secret),
            _ => Err(format!("Unknown resource kind: {}", s)),
        }
    }
}

/// The kinds a ConfigMatch may select from and write into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceKind {
    ConfigMap,
    Secret,
}

impl SourceKind {
    /// Returns both source kinds.
    pub fn all() -> &'static [SourceKind] {
        &[SourceKind::ConfigMap, SourceKind::Secret]
    }
}

impl From<SourceKind> for ResourceKind {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::ConfigMap => ResourceKind::ConfigMap,
            SourceKind::Secret => ResourceKind::Secret,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        ResourceKind::from(*self).fmt(f)
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<ResourceKind>()? {
            ResourceKind::ConfigMap => Ok(SourceKind::ConfigMap),
            ResourceKind::Secret => Ok(SourceKind::Secret),
            ResourceKind::ConfigMatch => Err(format!("Unsupported source kind: {}", s)),
        }
    }
}

/// Namespaced identity of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Back-reference from a managed object to the object that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

/// Metadata for a resource, following K8s conventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// The name of the object, unique per kind and namespace.
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Assigned by the store on creation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,

    /// Opaque version used for compare-and-swap updates.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    /// Creates a new ObjectMeta with just a namespace and name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Adds a label to the metadata.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Sets the creation timestamp.
    pub fn with_creation_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.creation_timestamp = Some(timestamp);
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// Returns the value of the match-group label, if present.
    pub fn group_label(&self) -> Option<&str> {
        self.labels.get(GROUP_LABEL).map(String::as_str)
    }
}

/// A generic K8s-style resource wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource<T> {
    pub api_version: String,
    pub kind: ResourceKind,
    pub metadata: ObjectMeta,
    pub spec: T,
}

impl<T> Resource<T> {
    /// Creates a new resource with the given kind and spec.
    pub fn new(kind: ResourceKind, metadata: ObjectMeta, spec: T) -> Self {
        Self {
            api_version: kind.api_version().to_string(),
            kind,
            metadata,
            spec,
        }
    }

    /// Returns the name of the resource.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }
}

// ============================================================================
// ConfigMatch Resource
// ============================================================================

/// Where to look for candidate source objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub kind: SourceKind,

    /// Regular expression searched for in candidate names.
    pub pattern: String,

    /// Namespace to select from; empty means the ConfigMatch's own namespace.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Group label value that scopes the candidates.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub match_group: String,
}

/// The object the newest source is mirrored into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub kind: SourceKind,
    pub name: String,

    /// Empty means the ConfigMatch's own namespace.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

/// ConfigMatch specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMatchSpec {
    pub source_ref: SourceRef,
    pub target: Target,
}

pub type ConfigMatch = Resource<ConfigMatchSpec>;

impl Resource<ConfigMatchSpec> {
    /// Creates a ConfigMatch in the given namespace.
    pub fn config_match(metadata: ObjectMeta, spec: ConfigMatchSpec) -> Self {
        Self::new(ResourceKind::ConfigMatch, metadata, spec)
    }

    /// The group whose members are candidates for this match.
    ///
    /// `matchGroup` wins when set; otherwise the ConfigMatch's own group
    /// label is used.
    pub fn effective_group(&self) -> Option<&str> {
        let match_group = self.spec.source_ref.match_group.as_str();
        if !match_group.is_empty() {
            return Some(match_group);
        }
        self.metadata.group_label()
    }

    pub fn source_namespace(&self) -> &str {
        non_empty_or(&self.spec.source_ref.namespace, &self.metadata.namespace)
    }

    pub fn target_key(&self) -> ObjectKey {
        ObjectKey::new(
            non_empty_or(&self.spec.target.namespace, &self.metadata.namespace),
            &self.spec.target.name,
        )
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

// ============================================================================
// Data objects (ConfigMap, Secret)
// ============================================================================

/// A ConfigMap or Secret: labeled, named, timestamped, opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    pub kind: SourceKind,
    pub metadata: ObjectMeta,

    /// `None` is an object that never had data, distinct from an empty map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload>,
}

impl DataObject {
    pub fn new(kind: SourceKind, metadata: ObjectMeta) -> Self {
        Self {
            kind,
            metadata,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = Some(data);
        self
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }
}

/// What the selection and routing code needs from a candidate source.
pub trait SourceObject {
    fn kind(&self) -> SourceKind;
    fn meta(&self) -> &ObjectMeta;
    fn payload(&self) -> Option<&Payload>;

    fn name(&self) -> &str {
        &self.meta().name
    }

    fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.meta().creation_timestamp
    }

    fn group_label(&self) -> Option<&str> {
        self.meta().group_label()
    }
}

impl SourceObject for DataObject {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn payload(&self) -> Option<&Payload> {
        self.data.as_ref()
    }
}
