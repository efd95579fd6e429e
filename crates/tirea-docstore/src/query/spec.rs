//! Declarative query specs and the function-carrying arguments they accept.

use super::{QueryContext, WhereClause};
use crate::error::StoreResult;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Element predicate.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
/// Element mapper (also used as an `orderBy` key selector).
pub type Mapper = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
/// Element comparator.
pub type Comparator = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;
/// A query written as a function. Reads through the context are tracked.
pub type Resolver =
    Arc<dyn Fn(&Value, &mut QueryContext<'_>) -> StoreResult<Value> + Send + Sync>;

/// The argument of a directive.
#[derive(Clone)]
pub enum QueryArg {
    /// Plain JSON (descriptors, counts, field names).
    Value(Value),
    Predicate(Predicate),
    Mapper(Mapper),
    Comparator(Comparator),
    /// A where descriptor that may carry per-field predicates.
    Where(WhereClause),
}

impl QueryArg {
    pub fn predicate(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        QueryArg::Predicate(Arc::new(f))
    }

    pub fn mapper(f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        QueryArg::Mapper(Arc::new(f))
    }

    pub fn comparator(f: impl Fn(&Value, &Value) -> Ordering + Send + Sync + 'static) -> Self {
        QueryArg::Comparator(Arc::new(f))
    }

    /// The JSON argument, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            QueryArg::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for QueryArg {
    fn from(value: Value) -> Self {
        QueryArg::Value(value)
    }
}

impl From<WhereClause> for QueryArg {
    fn from(clause: WhereClause) -> Self {
        QueryArg::Where(clause)
    }
}

impl fmt::Debug for QueryArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryArg::Value(v) => f.debug_tuple("Value").field(v).finish(),
            QueryArg::Predicate(_) => f.write_str("Predicate(..)"),
            QueryArg::Mapper(_) => f.write_str("Mapper(..)"),
            QueryArg::Comparator(_) => f.write_str("Comparator(..)"),
            QueryArg::Where(w) => f.debug_tuple("Where").field(w).finish(),
        }
    }
}

/// One entry of an object spec node.
#[derive(Clone, Debug)]
pub enum QueryEntry {
    /// `$name: arg`.
    Directive { name: String, arg: QueryArg },
    /// `$each: spec`, applied per element of an array.
    Each(QuerySpec),
    /// A projected child field.
    Child { key: String, spec: QuerySpec },
}

/// A declarative query.
///
/// JSON form: `true` passes the value through, any other non-object is a
/// literal, and in an object `$`-prefixed keys are directives (`$each`
/// takes a sub-spec) while the remaining keys are projected children.
///
/// ```
/// use tirea_docstore::query::QuerySpec;
/// use serde_json::json;
///
/// let spec = QuerySpec::from_json(json!({
///     "items": {"$where": {"done": {"$eq": true}}, "$limit": 10},
///     "title": true,
/// }));
/// assert!(matches!(spec, QuerySpec::Object(ref entries) if entries.len() == 2));
/// ```
#[derive(Clone, Debug)]
pub enum QuerySpec {
    Pass,
    Literal(Value),
    Object(Vec<QueryEntry>),
}

impl QuerySpec {
    /// An empty object node.
    pub fn object() -> Self {
        QuerySpec::Object(Vec::new())
    }

    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Bool(true) => QuerySpec::Pass,
            Value::Object(fields) => QuerySpec::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| match key.strip_prefix('$') {
                        Some("each") => QueryEntry::Each(QuerySpec::from_json(value)),
                        Some(name) => QueryEntry::Directive {
                            name: name.to_string(),
                            arg: QueryArg::Value(value),
                        },
                        None => QueryEntry::Child {
                            key,
                            spec: QuerySpec::from_json(value),
                        },
                    })
                    .collect(),
            ),
            other => QuerySpec::Literal(other),
        }
    }

    fn push(self, entry: QueryEntry) -> Self {
        match self {
            QuerySpec::Object(mut entries) => {
                entries.push(entry);
                QuerySpec::Object(entries)
            }
            _ => QuerySpec::Object(vec![entry]),
        }
    }

    /// Add a directive (`name` without the `$` sigil).
    pub fn directive(self, name: impl Into<String>, arg: impl Into<QueryArg>) -> Self {
        let name = name.into();
        let name = name.strip_prefix('$').map(str::to_string).unwrap_or(name);
        self.push(QueryEntry::Directive {
            name,
            arg: arg.into(),
        })
    }

    /// Project each array element through `spec`.
    pub fn each(self, spec: QuerySpec) -> Self {
        self.push(QueryEntry::Each(spec))
    }

    /// Project a child field.
    pub fn child(self, key: impl Into<String>, spec: QuerySpec) -> Self {
        self.push(QueryEntry::Child {
            key: key.into(),
            spec,
        })
    }
}

impl From<Value> for QuerySpec {
    fn from(value: Value) -> Self {
        QuerySpec::from_json(value)
    }
}

/// A query: a declarative spec (compiled once per allocation) or a resolver.
#[derive(Clone)]
pub enum Query {
    Spec(Arc<QuerySpec>),
    Resolver(Resolver),
}

impl Query {
    pub fn spec(spec: QuerySpec) -> Self {
        Query::Spec(Arc::new(spec))
    }

    pub fn from_json(value: Value) -> Self {
        Query::spec(QuerySpec::from_json(value))
    }

    pub fn resolver(
        f: impl Fn(&Value, &mut QueryContext<'_>) -> StoreResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Query::Resolver(Arc::new(f))
    }
}

impl From<QuerySpec> for Query {
    fn from(spec: QuerySpec) -> Self {
        Query::spec(spec)
    }
}

impl From<Arc<QuerySpec>> for Query {
    fn from(spec: Arc<QuerySpec>) -> Self {
        Query::Spec(spec)
    }
}

impl From<Value> for Query {
    fn from(value: Value) -> Self {
        Query::from_json(value)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Spec(spec) => f.debug_tuple("Spec").field(spec).finish(),
            Query::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}
