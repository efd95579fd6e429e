//! Error types for tirea-docstore operations.

use crate::Path;
use thiserror::Error;

/// Result type alias for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while mutating or querying a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The root must always be an object.
    #[error("root must be an object, found {found}")]
    RootShape {
        /// The type of the rejected value.
        found: &'static str,
    },

    /// Type mismatch while walking a path.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The path where the mismatch occurred.
        path: Path,
        /// The expected type.
        expected: &'static str,
        /// The actual type found.
        found: &'static str,
    },

    /// A patch referenced a mutation operator that is not registered.
    #[error("unknown mutation operator `{kind}` at {path}")]
    UnknownOperator {
        /// The operator kind.
        kind: String,
        /// Where the command appeared in the patch.
        path: Path,
    },

    /// A query spec used a directive that is not registered.
    #[error("unknown query operator `${name}` at {path}")]
    UnknownQueryOperator {
        /// The directive name without the sigil.
        name: String,
        /// The query node carrying the directive.
        path: Path,
    },

    /// Malformed query directive argument.
    #[error("invalid argument for query operator `${operator}`: {message}")]
    InvalidQuery {
        /// The directive name without the sigil.
        operator: String,
        /// Description of what went wrong.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create a root shape error for the given value.
    #[inline]
    pub fn root_shape(found: &serde_json::Value) -> Self {
        StoreError::RootShape {
            found: value_type_name(found),
        }
    }

    /// Create a type mismatch error.
    #[inline]
    pub fn type_mismatch(path: Path, expected: &'static str, found: &'static str) -> Self {
        StoreError::TypeMismatch {
            path,
            expected,
            found,
        }
    }

    /// Create an unknown operator error.
    #[inline]
    pub fn unknown_operator(kind: impl Into<String>, path: Path) -> Self {
        StoreError::UnknownOperator {
            kind: kind.into(),
            path,
        }
    }

    /// Create an unknown query operator error.
    #[inline]
    pub fn unknown_query_operator(name: impl Into<String>, path: Path) -> Self {
        StoreError::UnknownQueryOperator {
            name: name.into(),
            path,
        }
    }

    /// Create an invalid query argument error.
    #[inline]
    pub fn invalid_query(operator: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::InvalidQuery {
            operator: operator.into(),
            message: message.into(),
        }
    }
}

/// Get the type name of a JSON value.
#[inline]
pub fn value_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = StoreError::unknown_operator("explode", path!("a", 0));
        assert_eq!(err.to_string(), "unknown mutation operator `explode` at $.a[0]");

        let err = StoreError::root_shape(&json!(3));
        assert_eq!(err.to_string(), "root must be an object, found number");

        let err = StoreError::unknown_query_operator("frobnicate", path!("items"));
        assert!(err.to_string().contains("$frobnicate"));
    }

    #[test]
    fn test_value_type_name() {
        assert_eq!(value_type_name(&json!(null)), "null");
        assert_eq!(value_type_name(&json!(true)), "boolean");
        assert_eq!(value_type_name(&json!(42)), "number");
        assert_eq!(value_type_name(&json!("hello")), "string");
        assert_eq!(value_type_name(&json!([1, 2, 3])), "array");
        assert_eq!(value_type_name(&json!({"a": 1})), "object");
    }
}
