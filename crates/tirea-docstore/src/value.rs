//! Structural inspection of document values.
//!
//! The document tree is a closed set of variants. [`ValueKind`] names them and
//! [`deep_equal`] compares two trees variant by variant. Deep clones are plain
//! `Clone`: the tree is owned, so it cannot contain cycles.

use crate::access;
use crate::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The variant of a document value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    /// Arrays and objects can hold children.
    #[inline]
    pub fn is_container(self) -> bool {
        matches!(self, ValueKind::Array | ValueKind::Object)
    }
}

/// Classify a value.
#[inline]
pub fn kind_of(value: &Value) -> ValueKind {
    match value {
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Bool,
        Value::Number(_) => ValueKind::Number,
        Value::String(_) => ValueKind::String,
        Value::Array(_) => ValueKind::Array,
        Value::Object(_) => ValueKind::Object,
    }
}

/// Structural equality.
///
/// Numbers compare by value, so `1` and `1.0` are equal. Objects compare by
/// key set and per-key value; key order is ignored.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => {
            if x == y {
                return true;
            }
            match (x.as_i64(), y.as_i64()) {
                (Some(i), Some(j)) => i == j,
                _ => matches!((x.as_f64(), y.as_f64()), (Some(f), Some(g)) if f == g),
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| deep_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| deep_equal(v, other)))
        }
        _ => false,
    }
}

/// Equality over optional values, where `None` means "absent".
#[inline]
pub fn deep_equal_opt(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => deep_equal(x, y),
        _ => false,
    }
}

/// The state of one path at one moment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValueSnapshot {
    /// Whether the path resolved to a value.
    pub exists: bool,
    /// A clone of that value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ValueSnapshot {
    /// Snapshot of a missing path.
    #[inline]
    pub fn missing() -> Self {
        Self::default()
    }

    /// Snapshot of a present value.
    #[inline]
    pub fn present(value: Value) -> Self {
        Self {
            exists: true,
            value: Some(value),
        }
    }

    /// Capture the value at `path`.
    pub fn capture(root: &Value, path: &Path) -> Self {
        match access::get(root, path) {
            Some(v) => Self::present(v.clone()),
            None => Self::missing(),
        }
    }

    /// Same existence and deep-equal values.
    pub fn same_as(&self, other: &ValueSnapshot) -> bool {
        self.exists == other.exists && deep_equal_opt(self.value.as_ref(), other.value.as_ref())
    }
}
