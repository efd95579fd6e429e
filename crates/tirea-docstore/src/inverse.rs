//! Inverse patch synthesis.

use crate::{MutationChange, MutationPatch, Path};
use serde_json::Value;

/// Build the patch that restores the pre-commit values of `changes`.
///
/// Returns `None` when nothing changed. A change at the root inverts to a
/// single `set` of the whole original root. Otherwise every changed path
/// without a changed ancestor gets `set(before)` or `delete()`, assigned in
/// reverse application order.
///
/// ```
/// use tirea_docstore::{inverse::build_inverse, MutationChange, ValueSnapshot, path};
/// use serde_json::json;
///
/// let original = json!({"count": 0});
/// let changes = vec![MutationChange {
///     path: path!("count"),
///     operation: "set".into(),
///     before: ValueSnapshot::present(json!(0)),
///     after: ValueSnapshot::present(json!(5)),
/// }];
/// let inverse = build_inverse(&original, &changes).unwrap();
/// assert_eq!(inverse.to_json(), json!({"count": {"$op": "set", "payload": 0}}));
/// ```
pub fn build_inverse(original: &Value, changes: &[MutationChange]) -> Option<MutationPatch> {
    if changes.is_empty() {
        return None;
    }
    if changes.iter().any(|c| c.path.is_empty()) {
        return Some(MutationPatch::set(original.clone()));
    }

    let mut inverse = MutationPatch::empty();
    for change in changes.iter().rev() {
        if has_changed_ancestor(&change.path, changes) {
            continue;
        }
        let restore = match &change.before.value {
            Some(value) if change.before.exists => MutationPatch::set(value.clone()),
            _ => MutationPatch::delete(),
        };
        inverse.insert(&change.path, restore);
    }
    Some(inverse)
}

fn has_changed_ancestor(path: &Path, changes: &[MutationChange]) -> bool {
    changes
        .iter()
        .any(|other| other.path.len() < path.len() && other.path.is_prefix_of(path))
}
