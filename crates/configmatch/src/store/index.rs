//! Reverse index from match group to ConfigMatch identities.
//!
//! The index is derived state. It is rebuilt incrementally from observed
//! ConfigMatch changes and can be dropped and rebuilt at any time; nothing
//! that decides *what* to synchronize reads it.

use std::collections::{BTreeSet, HashMap};

use crate::api::{ConfigMatch, ObjectKey};

/// Returns the group key a ConfigMatch is indexed under.
///
/// This is `spec.sourceRef.matchGroup`, or the ConfigMatch's own group
/// label when `matchGroup` is empty.
pub fn index_key(spec: &ConfigMatch) -> Option<String> {
    spec.effective_group().map(str::to_string)
}

#[derive(Debug, Default, Clone)]
pub struct MatchIndex {
    by_group: HashMap<String, BTreeSet<ObjectKey>>,
    group_of: HashMap<ObjectKey, String>,
}

impl MatchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from a full listing.
    pub fn rebuild<'a>(specs: impl IntoIterator<Item = &'a ConfigMatch>) -> Self {
        let mut index = Self::new();
        for spec in specs {
            index.insert(spec);
        }
        index
    }

    /// Records a created or updated ConfigMatch, moving it between groups
    /// if its key changed.
    pub fn insert(&mut self, spec: &ConfigMatch) {
        let key = spec.key();
        self.remove(&key);

        if let Some(group) = index_key(spec) {
            self.by_group
                .entry(group.clone())
                .or_default()
                .insert(key.clone());
            self.group_of.insert(key, group);
        }
    }

    /// Forgets a deleted ConfigMatch.
    pub fn remove(&mut self, key: &ObjectKey) {
        let Some(group) = self.group_of.remove(key) else {
            return;
        };
        if let Some(members) = self.by_group.get_mut(&group) {
            members.remove(key);
            if members.is_empty() {
                self.by_group.remove(&group);
            }
        }
    }

    /// Identities indexed under `group`, in key order.
    pub fn lookup(&self, group: &str) -> Vec<ObjectKey> {
        self.by_group
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of indexed ConfigMatch objects.
    pub fn len(&self) -> usize {
        self.group_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group_of.is_empty()
    }
}
