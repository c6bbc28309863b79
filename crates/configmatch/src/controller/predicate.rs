//! Event predicates deciding which watch events reach the router.

use crate::api::{ConfigMatch, DataObject, ObjectMeta, SourceObject, GROUP_LABEL};
use crate::store::{Change, ChangeType};

/// Returns true when a source change alters the payload this controller
/// propagates.
///
/// A create (`old` absent) is always significant. Otherwise the change is
/// significant when data appears where there was none, or when both sides
/// carry data that differs. Metadata-only updates and removal of the
/// payload are not.
pub fn is_significant<S: SourceObject + ?Sized>(old: Option<&S>, new: &S) -> bool {
    let Some(old) = old else {
        return true;
    };

    match (old.payload(), new.payload()) {
        (None, Some(_)) => true,
        (Some(old), Some(new)) => old != new,
        _ => false,
    }
}

/// Objects without the group label are not managed by this controller.
pub fn has_group_label(meta: &ObjectMeta) -> bool {
    meta.labels.contains_key(GROUP_LABEL)
}

/// Combined predicate for ConfigMap and Secret events.
///
/// Deletions are admitted: removing a source can change which object is the
/// newest match.
pub fn admit_object_change(change: &Change<DataObject>) -> bool {
    if !has_group_label(&change.new.metadata) {
        return false;
    }
    match change.change_type {
        ChangeType::Added | ChangeType::Deleted => true,
        ChangeType::Modified => is_significant(change.old.as_ref(), &change.new),
    }
}

/// Predicate for ConfigMatch events.
pub fn admit_match_change(change: &Change<ConfigMatch>) -> bool {
    has_group_label(&change.new.metadata)
}
