//! The reconciliation step: select the newest matching source and mirror
//! its payload into the target.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::error::{OwnerReferenceError, ReconcileError};
use super::pattern::{self, CompiledPattern};
use crate::api::{
    ConfigMatch, DataObject, ObjectKey, ObjectMeta, OwnerReference, Payload, SourceKind,
    SourceObject, GROUP_LABEL,
};
use crate::store::{LabelSelector, ResourceStore};

/// Bounds the create-or-update loop when it keeps losing optimistic
/// concurrency races.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before `attempt` (1-based). The first attempt runs immediately.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
        }
    }
}

/// What a target write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

/// Successful end states of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum ReconcileOutcome {
    /// The ConfigMatch no longer exists.
    Deleted,
    /// No object of the source kind carries the group label.
    NoCandidates,
    /// Candidates exist but none matches the pattern. The target is left as is.
    NoMatch,
    Synced {
        source: ObjectKey,
        target: ObjectKey,
        result: OperationResult,
    },
}

impl std::fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileOutcome::Deleted => write!(f, "deleted"),
            ReconcileOutcome::NoCandidates => write!(f, "no candidates"),
            ReconcileOutcome::NoMatch => write!(f, "no matching source"),
            ReconcileOutcome::Synced {
                source,
                target,
                result,
            } => write!(f, "{} -> {} ({:?})", source, target, result),
        }
    }
}

/// Picks the most recently created candidate whose name matches `pattern`.
///
/// Only a strictly later creation timestamp displaces the current pick, so
/// among equal timestamps the candidate seen first wins. Stores list in
/// `(namespace, name)` order, which makes that the lexicographically first
/// name. Candidates without a timestamp sort before all others.
pub fn select_newest<'a, S: SourceObject>(
    candidates: &'a [S],
    pattern: &CompiledPattern,
) -> Option<&'a S> {
    let mut newest: Option<&S> = None;
    for candidate in candidates.iter().filter(|c| pattern.matches(c.name())) {
        match newest {
            Some(current) if candidate.creation_timestamp() <= current.creation_timestamp() => {}
            _ => newest = Some(candidate),
        }
    }
    newest
}

/// Adds or replaces `owner` in the object's owner references.
///
/// An existing reference to the same kind and name is replaced in place.
pub fn set_owner_reference(
    owner: &ConfigMatch,
    obj: &mut DataObject,
) -> Result<(), OwnerReferenceError> {
    if owner.metadata.uid.is_empty() {
        return Err(OwnerReferenceError::MissingUid {
            owner: owner.key().to_string(),
        });
    }
    if owner.metadata.namespace != obj.metadata.namespace {
        return Err(OwnerReferenceError::CrossNamespace {
            owner: owner.key().to_string(),
            object: obj.key().to_string(),
        });
    }

    let reference = OwnerReference {
        api_version: owner.api_version.clone(),
        kind: owner.kind.to_string(),
        name: owner.metadata.name.clone(),
        uid: owner.metadata.uid.clone(),
        controller: None,
        block_owner_deletion: None,
    };

    let refs = &mut obj.metadata.owner_references;
    match refs
        .iter_mut()
        .find(|r| r.kind == reference.kind && r.name == reference.name)
    {
        Some(existing) => *existing = reference,
        None => refs.push(reference),
    }
    Ok(())
}

/// Creates or updates the target so its payload equals `payload`.
///
/// Ownership is decided by an explicit existence check: a missing target is
/// created with `owner` as its owner; an existing target only has its
/// payload replaced, and is not written at all when the payload already
/// matches. Lost races (the target appeared, changed or vanished between
/// read and write) restart from a fresh read, up to `retry.max_attempts`.
pub async fn sync_target(
    store: &dyn ResourceStore,
    owner: &ConfigMatch,
    kind: SourceKind,
    target: &ObjectKey,
    payload: Option<&Payload>,
    retry: &RetryPolicy,
) -> Result<OperationResult, ReconcileError> {
    let attempts = retry.max_attempts.max(1);

    for attempt in 1..=attempts {
        let delay = retry.delay_for(attempt);
        if !delay.is_zero() {
            debug!(target_object = %target, attempt, ?delay, "Retrying target sync");
            tokio::time::sleep(delay).await;
        }

        let write = match store.get_object(kind, target).await? {
            None => {
                let mut obj = DataObject::new(
                    kind,
                    ObjectMeta::new(&target.namespace, &target.name),
                );
                set_owner_reference(owner, &mut obj)?;
                obj.data = payload.cloned();
                store
                    .create_object(obj)
                    .await
                    .map(|_| OperationResult::Created)
            }
            Some(mut existing) => {
                if existing.data.as_ref() == payload {
                    return Ok(OperationResult::Unchanged);
                }
                existing.data = payload.cloned();
                store
                    .update_object(existing)
                    .await
                    .map(|_| OperationResult::Updated)
            }
        };

        match write {
            Ok(result) => return Ok(result),
            Err(e) if e.is_conflict() || e.is_not_found() => {
                warn!(
                    target_object = %target,
                    attempt,
                    max_attempts = attempts,
                    "Target sync lost a concurrent update: {}",
                    e
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ReconcileError::ConflictRetriesExhausted {
        target: target.to_string(),
        attempts,
    })
}

/// Runs the reconciliation step for one ConfigMatch identity.
///
/// Every call re-reads the ConfigMatch and its candidates from the store,
/// so it is safe to repeat and keeps no state between calls.
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    retry: RetryPolicy,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcileError> {
        let span = info_span!("reconcile", configmatch = %key);
        self.reconcile_inner(key).instrument(span).await
    }

    async fn reconcile_inner(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(spec) = self.store.get_match(key).await? else {
            debug!("ConfigMatch not found, nothing to do");
            return Ok(ReconcileOutcome::Deleted);
        };

        let source_ref = &spec.spec.source_ref;
        let pattern = pattern::compile(&source_ref.pattern).map_err(|e| {
            error!(pattern = %source_ref.pattern, "Error compiling pattern: {}", e);
            e
        })?;

        let kind = source_ref.kind;
        let group = spec.effective_group().unwrap_or_default();
        let selector = LabelSelector::new().equals(GROUP_LABEL, group);
        info!(kind = %kind, group = %group, "Reconciling {}", kind);

        let candidates = self
            .store
            .list_objects(kind, Some(spec.source_namespace()), &selector)
            .await?;
        if candidates.is_empty() {
            info!(kind = %kind, group = %group, "No {} objects found in group", kind);
            return Ok(ReconcileOutcome::NoCandidates);
        }

        let Some(newest) = select_newest(&candidates, &pattern) else {
            info!(
                candidates = candidates.len(),
                pattern = %pattern.as_str(),
                "No candidate matches the pattern, leaving target untouched"
            );
            return Ok(ReconcileOutcome::NoMatch);
        };

        let target = spec.target_key();
        let result = sync_target(
            self.store.as_ref(),
            &spec,
            spec.spec.target.kind,
            &target,
            newest.data.as_ref(),
            &self.retry,
        )
        .await?;

        info!(
            source = %newest.key(),
            target_object = %target,
            result = ?result,
            "Synchronized target"
        );
        Ok(ReconcileOutcome::Synced {
            source: newest.key(),
            target,
            result,
        })
    }
}
