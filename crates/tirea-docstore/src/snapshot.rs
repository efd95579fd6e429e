//! Persisted snapshots.
//!
//! A snapshot is either a copy of the state or the trailing raw patches of
//! the commit log. Restoring always goes through
//! [`DocumentStore::materialize_external_patch`], so a restore is an ordinary
//! external commit.

use crate::{error::StoreResult, store::now_millis, DocumentStore, MutationPatch};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStrategy {
    /// A copy of the current state.
    #[default]
    State,
    /// The raw patches of the newest commits, replayed in order on restore.
    Commits,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub version: u32,
    pub strategy: SnapshotStrategy,
    /// Unix epoch milliseconds.
    pub stored_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commits: Option<Vec<MutationPatch>>,
}

impl PersistedSnapshot {
    pub fn to_json_string(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_str(text: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_value(value: &Value) -> StoreResult<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

impl DocumentStore {
    /// Capture the store for persistence. `max_commits` limits how many
    /// trailing commits a `Commits` snapshot keeps.
    pub fn persisted_snapshot(
        &self,
        strategy: SnapshotStrategy,
        max_commits: Option<usize>,
    ) -> PersistedSnapshot {
        let (state, commits) = match strategy {
            SnapshotStrategy::State => (Some((*self.state()).clone()), None),
            SnapshotStrategy::Commits => {
                let log = self.commit_log();
                let keep = max_commits.unwrap_or(log.len()).min(log.len());
                let patches = log[log.len() - keep..]
                    .iter()
                    .map(|record| record.patch.clone())
                    .collect();
                (None, Some(patches))
            }
        };
        PersistedSnapshot {
            version: SNAPSHOT_VERSION,
            strategy,
            stored_at: now_millis(),
            state,
            commits,
        }
    }

    /// Apply a persisted snapshot. `false` when `value` is not a valid
    /// snapshot or a replayed patch fails.
    pub fn restore_snapshot(&self, value: &Value) -> bool {
        match PersistedSnapshot::from_value(value) {
            Ok(snapshot) => self.apply_snapshot(snapshot),
            Err(error) => {
                tracing::warn!(error = %error, "snapshot does not match the persisted format");
                false
            }
        }
    }

    /// Parse and apply a persisted snapshot.
    pub fn restore_snapshot_str(&self, text: &str) -> bool {
        match PersistedSnapshot::from_json_str(text) {
            Ok(snapshot) => self.apply_snapshot(snapshot),
            Err(error) => {
                tracing::warn!(error = %error, "snapshot is not a persisted snapshot");
                false
            }
        }
    }

    fn apply_snapshot(&self, snapshot: PersistedSnapshot) -> bool {
        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(version = snapshot.version, "unsupported snapshot version");
            return false;
        }
        let metadata = json!({"restored": true, "storedAt": snapshot.stored_at});
        match (snapshot.strategy, snapshot.state, snapshot.commits) {
            (SnapshotStrategy::State, Some(state @ Value::Object(_)), _) => self
                .materialize_external_patch(MutationPatch::set(state), Some(metadata))
                .map_err(|error| tracing::warn!(error = %error, "snapshot restore failed"))
                .is_ok(),
            (SnapshotStrategy::Commits, _, Some(commits)) => {
                for patch in commits {
                    if let Err(error) =
                        self.materialize_external_patch(patch, Some(metadata.clone()))
                    {
                        tracing::warn!(error = %error, "snapshot replay failed");
                        return false;
                    }
                }
                true
            }
            (strategy, _, _) => {
                tracing::warn!(strategy = ?strategy, "snapshot is missing its payload");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommitOptions;

    #[test]
    fn test_state_snapshot_round_trip() {
        let source = DocumentStore::new(json!({"a": {"b": [1, 2]}})).unwrap();
        let snap = source.persisted_snapshot(SnapshotStrategy::State, None);
        let text = snap.to_json_string().unwrap();
        assert!(text.contains("\"strategy\":\"state\""));
        assert!(text.contains("\"storedAt\""));

        let target = DocumentStore::new(json!({"stale": true})).unwrap();
        assert!(target.restore_snapshot_str(&text));
        assert_eq!(*target.state(), json!({"a": {"b": [1, 2]}}));
    }

    #[test]
    fn test_commit_snapshot_replays_trailing_patches() {
        let source = DocumentStore::new(json!({})).unwrap();
        for n in 1..=3 {
            source.commit(json!({"n": n}), CommitOptions::new()).unwrap();
        }
        source.commit(json!({"m": true}), CommitOptions::new()).unwrap();
        let snap = source.persisted_snapshot(SnapshotStrategy::Commits, Some(2));
        assert_eq!(snap.commits.as_ref().map(Vec::len), Some(2));

        let target = DocumentStore::new(json!({})).unwrap();
        assert!(target.restore_snapshot(&serde_json::to_value(&snap).unwrap()));
        assert_eq!(*target.state(), json!({"n": 3, "m": true}));
        assert!(target
            .commit_log()
            .iter()
            .all(|r| r.source == crate::CommitSource::External));
    }

    #[test]
    fn test_rejects_malformed_snapshots() {
        let store = DocumentStore::new(json!({"keep": 1})).unwrap();
        assert!(!store.restore_snapshot_str("not json"));
        assert!(!store.restore_snapshot(&json!({"version": 2, "strategy": "state", "storedAt": 0, "state": {}})));
        assert!(!store.restore_snapshot(&json!({"version": 1, "strategy": "state", "storedAt": 0})));
        assert!(!store.restore_snapshot(&json!({"version": 1, "strategy": "state", "storedAt": 0, "state": [1]})));
        assert!(!store.restore_snapshot(&json!({"version": 1, "strategy": "bogus", "storedAt": 0})));
        assert_eq!(*store.state(), json!({"keep": 1}));
    }

    #[test]
    fn test_parse_errors_are_serialization_errors() {
        let err = PersistedSnapshot::from_json_str("{\"version\": 1").unwrap_err();
        assert!(matches!(err, crate::StoreError::Serialization(_)));
        let err = PersistedSnapshot::from_value(&json!({"version": "one"})).unwrap_err();
        assert!(matches!(err, crate::StoreError::Serialization(_)));
    }
}
