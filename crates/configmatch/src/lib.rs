pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod store;

pub use api::{
    parse_manifests, ConfigMatch, ConfigMatchSpec, DataObject, Manifest, ObjectKey, ObjectMeta,
    Payload, SourceKind, SourceObject, GROUP_LABEL,
};
pub use config::{load_config, load_config_from_str, ControllerConfig, LoggingConfig};
pub use controller::{
    Controller, EventRouter, ReconcileOutcome, ReconcileRequest, Reconciler, WorkQueue,
};
pub use error::{ConfigError, ConfigMatchError, ManifestError, ReconcileError, Result, StoreError};
pub use store::{MemoryStore, ResourceStore, WatchEvent};
