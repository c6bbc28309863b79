use std::path::PathBuf;
use thiserror::Error;

pub use crate::controller::error::{OwnerReferenceError, ReconcileError};
pub use crate::store::error::StoreError;

#[derive(Error, Debug)]
pub enum ConfigMatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to parse manifest document {index}: {message}")]
    ParseYaml { index: usize, message: String },

    #[error("Unsupported apiVersion '{version}', expected '{expected}'")]
    InvalidApiVersion { version: String, expected: String },

    #[error("Unknown manifest kind: {0}")]
    UnknownKind(String),

    #[error("Invalid base64 in '{name}' key '{key}': {message}")]
    InvalidBase64 {
        name: String,
        key: String,
        message: String,
    },
}

impl ManifestError {
    pub fn parse(index: usize, e: serde_yaml::Error) -> Self {
        ManifestError::ParseYaml {
            index,
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigMatchError>;
