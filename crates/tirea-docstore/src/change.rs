//! Change log for a single patch application.

use crate::{Path, ValueSnapshot};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One effective write, recorded at its anchor path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationChange {
    /// Where the change was recorded.
    pub path: Path,
    /// Label of the last operation that touched the path (`set`, `delete`, ...).
    pub operation: String,
    /// The value at patch start.
    pub before: ValueSnapshot,
    /// The value once the patch finished.
    pub after: ValueSnapshot,
}

impl MutationChange {
    /// Whether the write left a visible difference.
    #[inline]
    pub fn is_effective(&self) -> bool {
        !self.before.same_as(&self.after)
    }
}

/// Accumulates changes while a patch executes.
///
/// Repeated writes to the same path coalesce into one entry: `before` keeps
/// the value at patch start while the operation label follows the latest
/// write. `after` is taken from the final tree in [`ChangeLog::finish`].
#[derive(Debug, Default)]
pub(crate) struct ChangeLog {
    entries: IndexMap<Path, MutationChange>,
}

impl ChangeLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a write at `path`. `original` is the tree at patch start.
    pub(crate) fn record(&mut self, path: Path, operation: &str, original: &Value) {
        if let Some(existing) = self.entries.get_mut(&path) {
            existing.operation = operation.to_string();
            return;
        }
        let before = ValueSnapshot::capture(original, &path);
        self.entries.insert(
            path.clone(),
            MutationChange {
                path,
                operation: operation.to_string(),
                before,
                after: ValueSnapshot::missing(),
            },
        );
    }

    /// Number of touched paths so far.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Resolve every entry against the final tree and drop the ones that
    /// ended up where they started.
    pub(crate) fn finish(self, final_state: &Value) -> Vec<MutationChange> {
        self.entries
            .into_values()
            .map(|mut change| {
                change.after = ValueSnapshot::capture(final_state, &change.path);
                change
            })
            .filter(MutationChange::is_effective)
            .collect()
    }
}

/// Classification of a commit's changed paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitDiff {
    /// Paths that did not exist before the commit.
    pub added_paths: Vec<Path>,
    /// Paths that no longer exist after the commit.
    pub removed_paths: Vec<Path>,
    /// Paths whose value was replaced.
    pub updated_paths: Vec<Path>,
}

impl CommitDiff {
    /// Classify changes by before/after existence.
    pub fn from_changes(changes: &[MutationChange]) -> Self {
        let mut diff = CommitDiff::default();
        for change in changes {
            let bucket = match (change.before.exists, change.after.exists) {
                (false, true) => &mut diff.added_paths,
                (true, false) => &mut diff.removed_paths,
                _ => &mut diff.updated_paths,
            };
            bucket.push(change.path.clone());
        }
        diff
    }

    /// Whether no path changed.
    pub fn is_empty(&self) -> bool {
        self.added_paths.is_empty() && self.removed_paths.is_empty() && self.updated_paths.is_empty()
    }
}
