//! Reconciliation error types.

use thiserror::Error;

use super::pattern::CompileError;
use crate::store::StoreError;

/// Errors that can occur while setting an owner reference.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OwnerReferenceError {
    #[error("Owner {owner} has no uid; it must be read from the store first")]
    MissingUid { owner: String },

    #[error("Cross-namespace owner references are disallowed: owner {owner}, object {object}")]
    CrossNamespace { owner: String, object: String },
}

/// Errors that fail a reconciliation attempt.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to set owner reference: {0}")]
    OwnerReference(#[from] OwnerReferenceError),

    #[error("Gave up synchronizing {target} after {attempts} conflicting attempts")]
    ConflictRetriesExhausted { target: String, attempts: u32 },
}

impl ReconcileError {
    /// Returns true if requeueing the same request could succeed.
    ///
    /// A bad pattern or an impossible owner reference fails the same way on
    /// every attempt until the ConfigMatch itself changes. Store failures are
    /// always requeued with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Compile(_) | ReconcileError::OwnerReference(_) => false,
            ReconcileError::Store(_) | ReconcileError::ConflictRetriesExhausted { .. } => true,
        }
    }
}
