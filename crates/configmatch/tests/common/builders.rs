//! Builder patterns for creating test objects programmatically.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};

use configmatch::api::{
    ConfigMatch, ConfigMatchSpec, DataObject, ObjectMeta, OwnerReference, Payload, SourceKind,
    SourceRef, Target, GROUP_LABEL,
};

pub const NAMESPACE: &str = "default";

/// Fixed instant `seconds` after an arbitrary epoch, for ordering fixtures.
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
}

/// Builds a payload from string pairs.
pub fn payload(pairs: &[(&str, &str)]) -> Payload {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
        .collect()
}

/// Builder for `ConfigMatch` instances.
pub struct ConfigMatchBuilder {
    meta: ObjectMeta,
    kind: SourceKind,
    pattern: String,
    source_namespace: String,
    match_group: String,
    target_kind: SourceKind,
    target_name: String,
    target_namespace: String,
}

impl ConfigMatchBuilder {
    /// A ConfigMap match in the default namespace, labeled and grouped "g1",
    /// writing to `<name>-out`.
    pub fn new(name: &str) -> Self {
        Self {
            meta: ObjectMeta::new(NAMESPACE, name).with_label(GROUP_LABEL, "g1"),
            kind: SourceKind::ConfigMap,
            pattern: ".*".to_string(),
            source_namespace: String::new(),
            match_group: "g1".to_string(),
            target_kind: SourceKind::ConfigMap,
            target_name: format!("{}-out", name),
            target_namespace: String::new(),
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.meta.namespace = namespace.to_string();
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = pattern.to_string();
        self
    }

    /// Sets both the source and target kind.
    pub fn kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self.target_kind = kind;
        self
    }

    pub fn target_kind(mut self, kind: SourceKind) -> Self {
        self.target_kind = kind;
        self
    }

    pub fn match_group(mut self, group: &str) -> Self {
        self.match_group = group.to_string();
        self
    }

    /// Sets the ConfigMatch's own group label.
    pub fn label(mut self, group: &str) -> Self {
        self.meta = self.meta.with_label(GROUP_LABEL, group);
        self
    }

    pub fn unlabeled(mut self) -> Self {
        self.meta.labels.remove(GROUP_LABEL);
        self
    }

    pub fn source_namespace(mut self, namespace: &str) -> Self {
        self.source_namespace = namespace.to_string();
        self
    }

    pub fn target(mut self, name: &str) -> Self {
        self.target_name = name.to_string();
        self
    }

    pub fn target_namespace(mut self, namespace: &str) -> Self {
        self.target_namespace = namespace.to_string();
        self
    }

    pub fn build(self) -> ConfigMatch {
        ConfigMatch::config_match(
            self.meta,
            ConfigMatchSpec {
                source_ref: SourceRef {
                    kind: self.kind,
                    pattern: self.pattern,
                    namespace: self.source_namespace,
                    match_group: self.match_group,
                },
                target: Target {
                    kind: self.target_kind,
                    name: self.target_name,
                    namespace: self.target_namespace,
                },
            },
        )
    }
}

/// Builder for ConfigMap and Secret objects.
pub struct ObjectBuilder {
    kind: SourceKind,
    meta: ObjectMeta,
    data: Option<Payload>,
}

impl ObjectBuilder {
    pub fn config_map(name: &str) -> Self {
        Self::new(SourceKind::ConfigMap, name)
    }

    pub fn secret(name: &str) -> Self {
        Self::new(SourceKind::Secret, name)
    }

    fn new(kind: SourceKind, name: &str) -> Self {
        Self {
            kind,
            meta: ObjectMeta::new(NAMESPACE, name),
            data: None,
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.meta.namespace = namespace.to_string();
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.meta = self.meta.with_label(GROUP_LABEL, group);
        self
    }

    pub fn created(mut self, seconds: i64) -> Self {
        self.meta = self.meta.with_creation_timestamp(at(seconds));
        self
    }

    pub fn data(mut self, pairs: &[(&str, &str)]) -> Self {
        self.data = Some(payload(pairs));
        self
    }

    pub fn owned_by(mut self, kind: &str, name: &str, uid: &str) -> Self {
        self.meta.owner_references.push(OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: uid.to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        });
        self
    }

    pub fn build(self) -> DataObject {
        DataObject {
            kind: self.kind,
            metadata: self.meta,
            data: self.data,
        }
    }
}
