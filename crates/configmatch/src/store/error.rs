//! Resource store error types.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: String, key: String },

    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: String, key: String },

    #[error("Conflict updating {kind} {key}: expected resourceVersion {expected}, found {actual}")]
    Conflict {
        kind: String,
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn not_found(kind: impl ToString, key: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }

    pub fn already_exists(kind: impl ToString, key: impl ToString) -> Self {
        Self::AlreadyExists {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }

    pub fn conflict(
        kind: impl ToString,
        key: impl ToString,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.to_string(),
            key: key.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Returns true for optimistic-concurrency failures: a concurrent writer
    /// created or updated the object between our read and our write.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::AlreadyExists { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Returns true if the error is likely transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        self.is_conflict() || matches!(self, StoreError::Unavailable(_))
    }
}
