//! Mutation commands: a named operator plus its payload.
//!
//! Commands are the leaves of a [`MutationPatch`](crate::MutationPatch).
//! The built-in kinds are `set`, `merge`, `delete`, `move`, `link` and
//! `unlink`; stores accept any other kind registered through
//! `register_mutation_operator`.

use crate::Path;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// The JSON key that marks an object as a command.
pub const COMMAND_TAG: &str = "$op";

/// A single mutation command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationCommand {
    /// Registered operator name.
    #[serde(rename = "$op")]
    pub kind: String,
    /// Operator payload; `null` when the operator takes none.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl MutationCommand {
    /// A command for an arbitrary (possibly custom) operator.
    #[inline]
    pub fn new(kind: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// Unconditional replace.
    #[inline]
    pub fn set(value: impl Into<Value>) -> Self {
        Self::new("set", value)
    }

    /// Array concatenation or shallow object merge.
    #[inline]
    pub fn merge(value: impl Into<Value>) -> Self {
        Self::new("merge", value)
    }

    /// Remove the value at the command's path.
    #[inline]
    pub fn delete() -> Self {
        Self::new("delete", Value::Null)
    }

    /// Move within the container at the command's path (`from`/`to` are
    /// keys or indices) or between two absolute paths (`from`/`to` are path
    /// arrays).
    #[inline]
    pub fn move_item(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self::new("move", json!({"from": from.into(), "to": to.into()}))
    }

    /// Move between two absolute paths.
    pub fn move_path(from: &Path, to: &Path) -> Self {
        Self::move_item(path_to_json(from), path_to_json(to))
    }

    /// Add graph links.
    #[inline]
    pub fn link(spec: LinkSpec) -> Self {
        Self::new("link", spec.into_payload())
    }

    /// Remove graph links.
    #[inline]
    pub fn unlink(spec: LinkSpec) -> Self {
        Self::new("unlink", spec.into_payload())
    }

    /// Decode the JSON encoding (`{"$op": kind, "payload": ...}`).
    ///
    /// Returns `None` for objects that do not carry the command tag.
    pub fn from_json_object(obj: &Map<String, Value>) -> Option<Self> {
        let kind = obj.get(COMMAND_TAG)?.as_str()?;
        Some(Self::new(
            kind,
            obj.get("payload").cloned().unwrap_or(Value::Null),
        ))
    }
}

fn path_to_json(path: &Path) -> Value {
    serde_json::to_value(path).unwrap_or(Value::Null)
}

/// Builder for `link`/`unlink` payloads.
///
/// ```
/// use tirea_docstore::{LinkSpec, MutationCommand};
///
/// let cmd = MutationCommand::link(LinkSpec::new("parent").to("b").bidirectional());
/// assert_eq!(cmd.kind, "link");
/// assert_eq!(cmd.payload["relation"], "parent");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSpec {
    /// Relation name (e.g. `parent`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    /// One target id or an array of target ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Value>,
    /// Explicit source node id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    /// Mirror the link from every target back to the source.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bidirectional: bool,
    /// Relation name used for the mirrored link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse_relation: Option<String>,
    /// Where node records live (defaults to `["nodes"]`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes_path: Option<Value>,
}

impl LinkSpec {
    /// Start a spec for the given relation.
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: Some(relation.into()),
            ..Self::default()
        }
    }

    /// Add a target id.
    pub fn to(mut self, target: impl Into<Value>) -> Self {
        let target = target.into();
        self.to = Some(match self.to.take() {
            None => target,
            Some(Value::Array(mut items)) => {
                items.push(target);
                Value::Array(items)
            }
            Some(existing) => Value::Array(vec![existing, target]),
        });
        self
    }

    /// Use an explicit source node id.
    pub fn from(mut self, source: impl Into<Value>) -> Self {
        self.from = Some(source.into());
        self
    }

    /// Mirror links back from the targets.
    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    /// Mirror links back under a different relation name.
    pub fn inverse_relation(mut self, relation: impl Into<String>) -> Self {
        self.inverse_relation = Some(relation.into());
        self
    }

    /// Keep node records under a different path.
    pub fn nodes_path(mut self, path: &Path) -> Self {
        self.nodes_path = Some(path_to_json(path));
        self
    }

    fn into_payload(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
