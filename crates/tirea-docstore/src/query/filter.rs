//! Where descriptors.
//!
//! A descriptor maps field selectors (dot paths allowed) to either a value
//! that must be deep-equal, an object of comparison operators, or a
//! predicate. Arrays of descriptors are ANDed.

use super::Predicate;
use crate::{
    access,
    error::{StoreError, StoreResult},
    value::deep_equal,
    Path,
};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A comparison operator from a `{"$op": arg}` field descriptor.
#[derive(Clone, Debug, PartialEq)]
pub enum Comparison {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Contains(Value),
}

impl Comparison {
    fn parse(op: &str, arg: Value) -> StoreResult<Self> {
        let list = |arg: Value| match arg {
            Value::Array(items) => Ok(items),
            other => Err(StoreError::invalid_query(
                "where",
                format!("${op} expects an array, got {other}"),
            )),
        };
        Ok(match op {
            "eq" => Comparison::Eq(arg),
            "ne" => Comparison::Ne(arg),
            "gt" => Comparison::Gt(arg),
            "gte" => Comparison::Gte(arg),
            "lt" => Comparison::Lt(arg),
            "lte" => Comparison::Lte(arg),
            "in" => Comparison::In(list(arg)?),
            "nin" => Comparison::Nin(list(arg)?),
            "contains" => Comparison::Contains(arg),
            other => {
                return Err(StoreError::invalid_query(
                    "where",
                    format!("unknown comparison `${other}`"),
                ))
            }
        })
    }

    /// `field` is `None` when the selector does not resolve.
    pub fn test(&self, field: Option<&Value>) -> bool {
        let field_or_null = field.unwrap_or(&Value::Null);
        match self {
            Comparison::Eq(v) => deep_equal(field_or_null, v),
            Comparison::Ne(v) => !deep_equal(field_or_null, v),
            Comparison::Gt(v) => ordered(field, v).is_some_and(Ordering::is_gt),
            Comparison::Gte(v) => ordered(field, v).is_some_and(Ordering::is_ge),
            Comparison::Lt(v) => ordered(field, v).is_some_and(Ordering::is_lt),
            Comparison::Lte(v) => ordered(field, v).is_some_and(Ordering::is_le),
            Comparison::In(items) => items.iter().any(|item| deep_equal(field_or_null, item)),
            Comparison::Nin(items) => !items.iter().any(|item| deep_equal(field_or_null, item)),
            Comparison::Contains(needle) => match field {
                Some(Value::Array(items)) => items.iter().any(|item| deep_equal(item, needle)),
                Some(Value::String(s)) => needle.as_str().is_some_and(|n| s.contains(n)),
                Some(Value::Object(map)) => needle.as_str().is_some_and(|k| map.contains_key(k)),
                _ => false,
            },
        }
    }
}

/// Ordering between comparable scalars of the same kind.
fn ordered(field: Option<&Value>, arg: &Value) -> Option<Ordering> {
    match (field?, arg) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Total order used for sorting: null < bool < number < string < array < object.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// How one field is matched.
#[derive(Clone)]
pub enum FieldMatch {
    /// Deep equality.
    Equals(Value),
    /// Every comparison must hold.
    Compare(Vec<Comparison>),
    Predicate(Predicate),
}

impl FieldMatch {
    fn from_json(value: Value) -> StoreResult<Self> {
        match value {
            Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => ops
                .into_iter()
                .map(|(op, arg)| Comparison::parse(&op[1..], arg))
                .collect::<StoreResult<Vec<_>>>()
                .map(FieldMatch::Compare),
            other => Ok(FieldMatch::Equals(other)),
        }
    }

    pub fn test(&self, field: Option<&Value>) -> bool {
        match self {
            FieldMatch::Equals(v) => deep_equal(field.unwrap_or(&Value::Null), v),
            FieldMatch::Compare(all) => all.iter().all(|c| c.test(field)),
            FieldMatch::Predicate(p) => p(field.unwrap_or(&Value::Null)),
        }
    }
}

impl fmt::Debug for FieldMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldMatch::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            FieldMatch::Compare(c) => f.debug_tuple("Compare").field(c).finish(),
            FieldMatch::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A compiled where descriptor.
///
/// ```
/// use tirea_docstore::query::WhereClause;
/// use serde_json::json;
///
/// let clause = WhereClause::from_json(json!({"done": true, "meta.rank": {"$gte": 2}})).unwrap();
/// assert!(clause.matches(&json!({"done": true, "meta": {"rank": 3}})));
/// assert!(!clause.matches(&json!({"done": true, "meta": {"rank": 1}})));
/// ```
#[derive(Clone, Debug)]
pub enum WhereClause {
    /// Every field selector must match.
    Fields(Vec<(Path, FieldMatch)>),
    /// Every clause must match.
    All(Vec<WhereClause>),
}

impl Default for WhereClause {
    fn default() -> Self {
        WhereClause::Fields(Vec::new())
    }
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(value: Value) -> StoreResult<Self> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(WhereClause::from_json)
                .collect::<StoreResult<Vec<_>>>()
                .map(WhereClause::All),
            Value::Object(fields) => Self::from_fields(fields),
            other => Err(StoreError::invalid_query(
                "where",
                format!("expected an object or array descriptor, got {other}"),
            )),
        }
    }

    fn from_fields(fields: Map<String, Value>) -> StoreResult<Self> {
        fields
            .into_iter()
            .map(|(selector, value)| Ok((Path::parse(&selector), FieldMatch::from_json(value)?)))
            .collect::<StoreResult<Vec<_>>>()
            .map(WhereClause::Fields)
    }

    fn with(self, selector: &str, matcher: FieldMatch) -> Self {
        let entry = (Path::parse(selector), matcher);
        match self {
            WhereClause::Fields(mut fields) => {
                fields.push(entry);
                WhereClause::Fields(fields)
            }
            all => WhereClause::All(vec![all, WhereClause::Fields(vec![entry])]),
        }
    }

    /// Require `selector` to equal `value`.
    pub fn eq(self, selector: &str, value: impl Into<Value>) -> Self {
        self.with(selector, FieldMatch::Equals(value.into()))
    }

    /// Require a comparison on `selector`.
    pub fn compare(self, selector: &str, comparison: Comparison) -> Self {
        self.with(selector, FieldMatch::Compare(vec![comparison]))
    }

    /// Require `predicate` to hold for `selector`.
    pub fn field_predicate(
        self,
        selector: &str,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.with(selector, FieldMatch::Predicate(Arc::new(predicate)))
    }

    pub fn matches(&self, item: &Value) -> bool {
        match self {
            WhereClause::Fields(fields) => fields
                .iter()
                .all(|(selector, matcher)| matcher.test(access::get(item, selector))),
            WhereClause::All(clauses) => clauses.iter().all(|c| c.matches(item)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_comparisons() {
        let item = json!({"n": 5, "tags": ["a", "b"], "name": "alpha"});
        let check = |d: Value| WhereClause::from_json(d).unwrap().matches(&item);
        assert!(check(json!({"n": {"$gt": 4, "$lte": 5}})));
        assert!(!check(json!({"n": {"$lt": 5}})));
        assert!(check(json!({"n": {"$in": [1, 5]}})));
        assert!(check(json!({"n": {"$nin": [1, 2]}})));
        assert!(check(json!({"tags": {"$contains": "b"}})));
        assert!(check(json!({"name": {"$contains": "lph"}})));
        assert!(check(json!({"missing": {"$ne": 1}})));
        assert!(check(json!({"missing": null})));
        assert!(!check(json!({"missing": {"$gt": 0}})));
    }

    #[test]
    fn test_array_descriptors_are_anded() {
        let clause = WhereClause::from_json(json!([{"a": 1}, {"b": {"$eq": 2}}])).unwrap();
        assert!(clause.matches(&json!({"a": 1, "b": 2})));
        assert!(!clause.matches(&json!({"a": 1, "b": 3})));
    }

    #[test]
    fn test_unknown_comparison_is_rejected() {
        let err = WhereClause::from_json(json!({"a": {"$near": 1}})).unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery { .. }));
    }

    #[test]
    fn test_builder_with_predicate() {
        let clause = WhereClause::new()
            .eq("kind", "task")
            .field_predicate("title", |v| v.as_str().is_some_and(|s| s.starts_with("fix")));
        assert!(clause.matches(&json!({"kind": "task", "title": "fix bug"})));
        assert!(!clause.matches(&json!({"kind": "task", "title": "add"})));
    }

    #[test]
    fn test_compare_values_orders_mixed_kinds() {
        let mut xs = vec![json!("b"), json!(2), json!(null), json!("a"), json!(1.5)];
        xs.sort_by(compare_values);
        assert_eq!(xs, vec![json!(null), json!(1.5), json!(2), json!("a"), json!("b")]);
    }
}
