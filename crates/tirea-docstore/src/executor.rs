//! Patch executor.
//!
//! Walks a [`MutationPatch`] depth-first in key order against a scratch copy
//! of the state. Commands dispatch to the operator table, nested maps descend
//! one segment per key, bare values are an implicit `set`.
//!
//! Nothing here touches the live state: the caller swaps the scratch tree in
//! only when [`execute_patch`] returns `Ok`.

use crate::{
    access,
    change::ChangeLog,
    error::{StoreError, StoreResult},
    mutation::{MutationContext, MutationHandler},
    MutationChange, MutationCommand, MutationPatch, Path, Seg, ValueSnapshot,
};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// Operator table captured for one execution.
pub(crate) type OperatorTable = IndexMap<String, MutationHandler>;

/// The result of applying a patch to a scratch copy.
#[derive(Debug)]
pub(crate) struct PatchOutcome {
    /// The tree after every instruction applied.
    pub(crate) state: Value,
    /// Effective changes in first-write order.
    pub(crate) changes: Vec<MutationChange>,
}

/// Apply `patch` to a copy of `original`.
///
/// Fails on the first unknown operator or operator error; `original` is
/// never modified.
pub(crate) fn execute_patch(
    original: Arc<Value>,
    patch: &MutationPatch,
    operators: Arc<OperatorTable>,
) -> StoreResult<PatchOutcome> {
    let mut exec = Execution {
        state: (*original).clone(),
        original,
        log: ChangeLog::new(),
        operators,
    };
    exec.apply(&Path::root(), patch)?;

    let Execution { state, log, .. } = exec;
    let changes = log.finish(&state);
    Ok(PatchOutcome { state, changes })
}

/// Mutable state of one patch application.
pub(crate) struct Execution {
    pub(crate) state: Value,
    pub(crate) original: Arc<Value>,
    pub(crate) log: ChangeLog,
    operators: Arc<OperatorTable>,
}

impl Execution {
    /// Apply a patch node at `base`.
    pub(crate) fn apply(&mut self, base: &Path, patch: &MutationPatch) -> StoreResult<()> {
        match patch {
            MutationPatch::Command(cmd) => self.dispatch(base, cmd),
            MutationPatch::Value(value) => {
                MutationContext::new(self, base.clone(), "set").set(value.clone())
            }
            MutationPatch::Nested(children) => {
                for (key, child) in children {
                    let seg = self.child_segment(base, key);
                    self.apply(&base.with_segment(seg), child)?;
                }
                Ok(())
            }
        }
    }

    fn dispatch(&mut self, path: &Path, cmd: &MutationCommand) -> StoreResult<()> {
        let handler = self
            .operators
            .get(cmd.kind.as_str())
            .cloned()
            .ok_or_else(|| StoreError::unknown_operator(&cmd.kind, path.clone()))?;
        let mut ctx = MutationContext::new(self, path.clone(), &cmd.kind);
        handler(&mut ctx, &cmd.payload)
    }

    /// Numeric keys under an array become index segments.
    fn child_segment(&self, base: &Path, key: &str) -> Seg {
        match access::get(&self.state, base) {
            Some(Value::Array(_)) if crate::path::looks_numeric(key) => key
                .parse()
                .map(Seg::Index)
                .unwrap_or_else(|_| Seg::key(key)),
            _ => Seg::key(key),
        }
    }

    /// Run `mutate` against the scratch tree and record the change at the
    /// write's anchor path if anything visibly changed.
    pub(crate) fn write(
        &mut self,
        target: &Path,
        operation: &str,
        mutate: impl FnOnce(&mut Value, &Path) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let canonical = access::canonicalize(&self.state, target);
        let anchor = anchor_path(&self.state, &canonical);
        let parent = anchor.parent();
        let parent_len = parent.as_ref().and_then(|p| array_len(&self.state, p));
        let before = ValueSnapshot::capture(&self.state, &anchor);

        mutate(&mut self.state, &canonical)?;

        let recorded = match parent {
            Some(parent)
                if parent_len.is_some() && parent_len != array_len(&self.state, &parent) =>
            {
                Some(parent)
            }
            _ if !before.same_as(&ValueSnapshot::capture(&self.state, &anchor)) => Some(anchor),
            _ => None,
        };
        if let Some(path) = recorded {
            self.log.record(path, operation, &self.original);
        }
        Ok(())
    }
}

/// The path at which a write to `target` is recorded: the shortest prefix
/// that is missing or a scalar standing where a container is needed, else
/// the target itself.
fn anchor_path(root: &Value, target: &Path) -> Path {
    for depth in 1..=target.len() {
        let prefix = target.prefix(depth);
        match access::get(root, &prefix) {
            None => return prefix,
            Some(value) if depth < target.len() && !value.is_object() && !value.is_array() => {
                return prefix
            }
            Some(_) => {}
        }
    }
    target.clone()
}

fn array_len(root: &Value, path: &Path) -> Option<usize> {
    access::get(root, path).and_then(Value::as_array).map(Vec::len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mutation, path};
    use serde_json::json;

    fn run(state: Value, patch: Value) -> StoreResult<PatchOutcome> {
        execute_patch(
            Arc::new(state),
            &MutationPatch::from(patch),
            Arc::new(mutation::builtin_operators()),
        )
    }

    #[test]
    fn test_anchor_path_rules() {
        let doc = json!({"a": {"b": 1}, "n": 5, "xs": [1]});
        assert_eq!(anchor_path(&doc, &path!("a", "b")), path!("a", "b"));
        assert_eq!(anchor_path(&doc, &path!("a", "c", "d")), path!("a", "c"));
        assert_eq!(anchor_path(&doc, &path!("n", "x")), path!("n"));
        assert_eq!(anchor_path(&doc, &Path::root()), Path::root());
    }

    #[test]
    fn test_implicit_set_and_nested() {
        let out = run(json!({"user": {"name": "a"}}), json!({"user": {"name": "b", "age": 3}}))
            .unwrap();
        assert_eq!(out.state, json!({"user": {"name": "b", "age": 3}}));
        assert_eq!(out.changes.len(), 2);
        assert_eq!(out.changes[0].path, path!("user", "name"));
        assert_eq!(out.changes[1].path, path!("user", "age"));
        assert!(!out.changes[1].before.exists);
    }

    #[test]
    fn test_numeric_keys_under_arrays_become_indices() {
        let out = run(
            json!({"items": [{"done": false}]}),
            json!({"items": {"0": {"done": {"$op": "set", "payload": true}}}}),
        )
        .unwrap();
        assert_eq!(out.state["items"][0]["done"], json!(true));
        assert_eq!(out.changes[0].path, Path::root().key("items").index(0).key("done"));
    }

    #[test]
    fn test_array_length_change_records_the_array() {
        let out = run(
            json!({"xs": ["a", "b"]}),
            json!({"xs": {"0": {"$op": "delete"}}}),
        )
        .unwrap();
        assert_eq!(out.state["xs"], json!(["b"]));
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].path, path!("xs"));
        assert_eq!(out.changes[0].before.value, Some(json!(["a", "b"])));
    }

    #[test]
    fn test_unknown_operator_reports_path() {
        let err = run(json!({}), json!({"a": {"b": {"$op": "explode"}}})).unwrap_err();
        match err {
            StoreError::UnknownOperator { kind, path } => {
                assert_eq!(kind, "explode");
                assert_eq!(path, path!("a", "b"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_idempotent_write_has_no_changes() {
        let out = run(json!({"count": 1}), json!({"count": {"$op": "set", "payload": 1}})).unwrap();
        assert!(out.changes.is_empty());
    }
}
