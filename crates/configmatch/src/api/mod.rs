//! Resource model for the configmatch controller.
//!
//! ConfigMatch objects describe intent; ConfigMaps and Secrets are the
//! data objects that are selected from and written into.

pub mod manifest;
pub mod resource;

pub use manifest::{parse_manifests, Manifest};
pub use resource::{
    ConfigMatch, ConfigMatchSpec, DataObject, ObjectKey, ObjectMeta, OwnerReference, Payload,
    Resource, ResourceKind, SourceKind, SourceObject, SourceRef, Target, API_VERSION,
    CORE_API_VERSION, GROUP_LABEL, MATCH_GROUP_INDEX,
};
