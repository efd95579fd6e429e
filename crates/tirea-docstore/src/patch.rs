//! Patch trees.
//!
//! A `MutationPatch` mirrors the shape of the document it edits: nested maps
//! descend into the tree, commands say what to do at a path, and bare values
//! are shorthand for `set`.

use crate::command::{MutationCommand, COMMAND_TAG};
use crate::{LinkSpec, Path, Seg};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tree of mutation instructions.
///
/// # JSON encoding
///
/// An object carrying the `"$op"` key is a command, any other object is a
/// nested patch, and any other value is an implicit `set`:
///
/// ```
/// use tirea_docstore::MutationPatch;
/// use serde_json::json;
///
/// let patch = MutationPatch::from(json!({
///     "count": {"$op": "set", "payload": 5},
///     "user": {"name": "Ada"},
/// }));
/// assert_eq!(patch.command_count(), 1);
/// assert_eq!(patch.to_json(), json!({
///     "count": {"$op": "set", "payload": 5},
///     "user": {"name": "Ada"},
/// }));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum MutationPatch {
    /// Dispatch to a mutation operator at this path.
    Command(MutationCommand),
    /// Descend per key (keys apply in insertion order).
    Nested(IndexMap<String, MutationPatch>),
    /// Implicit `set`.
    Value(Value),
}

impl MutationPatch {
    /// An empty nested patch.
    #[inline]
    pub fn empty() -> Self {
        MutationPatch::Nested(IndexMap::new())
    }

    /// `$set(value)`.
    #[inline]
    pub fn set(value: impl Into<Value>) -> Self {
        MutationPatch::Command(MutationCommand::set(value))
    }

    /// `$merge(value)`.
    #[inline]
    pub fn merge(value: impl Into<Value>) -> Self {
        MutationPatch::Command(MutationCommand::merge(value))
    }

    /// `$delete()`.
    #[inline]
    pub fn delete() -> Self {
        MutationPatch::Command(MutationCommand::delete())
    }

    /// `$move({from, to})`.
    #[inline]
    pub fn move_item(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        MutationPatch::Command(MutationCommand::move_item(from, to))
    }

    /// `$link(spec)`.
    #[inline]
    pub fn link(spec: LinkSpec) -> Self {
        MutationPatch::Command(MutationCommand::link(spec))
    }

    /// `$unlink(spec)`.
    #[inline]
    pub fn unlink(spec: LinkSpec) -> Self {
        MutationPatch::Command(MutationCommand::unlink(spec))
    }

    /// A command for a custom operator.
    #[inline]
    pub fn command(kind: impl Into<String>, payload: impl Into<Value>) -> Self {
        MutationPatch::Command(MutationCommand::new(kind, payload))
    }

    /// A patch that applies `node` at `path` and leaves everything else alone.
    ///
    /// ```
    /// use tirea_docstore::{path, MutationPatch};
    /// use serde_json::json;
    ///
    /// let patch = MutationPatch::at(&path!("items", 0, "done"), MutationPatch::set(true));
    /// assert_eq!(
    ///     patch.to_json(),
    ///     json!({"items": {"0": {"done": {"$op": "set", "payload": true}}}})
    /// );
    /// ```
    pub fn at(path: &Path, node: MutationPatch) -> Self {
        let mut patch = MutationPatch::empty();
        patch.insert(path, node);
        patch
    }

    /// Place `node` at `path` inside this patch.
    ///
    /// Commands or values found along the way are replaced by nested maps;
    /// inserting at the root replaces the whole patch.
    pub fn insert(&mut self, path: &Path, node: MutationPatch) {
        let Some((last, parents)) = path.segments().split_last() else {
            *self = node;
            return;
        };
        let mut current = self;
        for seg in parents {
            current = current
                .ensure_nested()
                .entry(segment_key(seg))
                .or_insert_with(MutationPatch::empty);
        }
        current.ensure_nested().insert(segment_key(last), node);
    }

    fn ensure_nested(&mut self) -> &mut IndexMap<String, MutationPatch> {
        if !matches!(self, MutationPatch::Nested(_)) {
            *self = MutationPatch::empty();
        }
        match self {
            MutationPatch::Nested(map) => map,
            _ => unreachable!("patch node was just replaced by a nested map"),
        }
    }

    /// Whether the patch contains no instruction at all.
    pub fn is_empty(&self) -> bool {
        match self {
            MutationPatch::Nested(map) => map.values().all(MutationPatch::is_empty),
            _ => false,
        }
    }

    /// Number of commands and implicit sets in the tree.
    pub fn command_count(&self) -> usize {
        match self {
            MutationPatch::Nested(map) => map.values().map(MutationPatch::command_count).sum(),
            _ => 1,
        }
    }

    /// Get the command at a path, if the tree has one there.
    pub fn command_at(&self, path: &Path) -> Option<&MutationCommand> {
        let mut current = self;
        for seg in path.iter() {
            match current {
                MutationPatch::Nested(map) => current = map.get(segment_key(seg).as_str())?,
                _ => return None,
            }
        }
        match current {
            MutationPatch::Command(cmd) => Some(cmd),
            _ => None,
        }
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> Value {
        match self {
            MutationPatch::Command(cmd) => {
                let mut obj = Map::new();
                obj.insert(COMMAND_TAG.to_string(), Value::String(cmd.kind.clone()));
                if !cmd.payload.is_null() {
                    obj.insert("payload".to_string(), cmd.payload.clone());
                }
                Value::Object(obj)
            }
            MutationPatch::Nested(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            MutationPatch::Value(v) => v.clone(),
        }
    }
}

fn segment_key(seg: &Seg) -> String {
    seg.object_key().into_owned()
}

impl Default for MutationPatch {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<MutationCommand> for MutationPatch {
    fn from(cmd: MutationCommand) -> Self {
        MutationPatch::Command(cmd)
    }
}

impl From<Value> for MutationPatch {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(obj) => match MutationCommand::from_json_object(&obj) {
                Some(cmd) => MutationPatch::Command(cmd),
                None => MutationPatch::Nested(
                    obj.into_iter()
                        .map(|(k, v)| (k, MutationPatch::from(v)))
                        .collect(),
                ),
            },
            other => MutationPatch::Value(other),
        }
    }
}

impl From<MutationPatch> for Value {
    fn from(patch: MutationPatch) -> Self {
        patch.to_json()
    }
}

impl<K: Into<String>> FromIterator<(K, MutationPatch)> for MutationPatch {
    fn from_iter<I: IntoIterator<Item = (K, MutationPatch)>>(iter: I) -> Self {
        MutationPatch::Nested(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
