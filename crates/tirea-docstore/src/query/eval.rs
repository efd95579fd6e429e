//! Plan evaluation with dependency capture.

use super::{
    plan::{ObjectPlan, PlanNode},
    CapabilityScope, QueryArg, QueryPlan,
};
use crate::{
    access,
    error::{StoreError, StoreResult},
    Path,
};
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A registered query directive. Receives its argument, the current value
/// and the evaluation context, and returns the transformed value.
pub type QueryOperator =
    Arc<dyn Fn(&QueryArg, Value, &mut QueryContext<'_>) -> StoreResult<Value> + Send + Sync>;

pub(crate) type QueryOperatorTable = IndexMap<String, QueryOperator>;

/// Evaluation state shared by every node of one query run.
///
/// Every path read through the context lands in the dependency set, whether
/// or not the scope allows the read.
pub struct QueryContext<'a> {
    state: &'a Value,
    scope: Option<&'a CapabilityScope>,
    operators: &'a QueryOperatorTable,
    dependencies: IndexSet<Path>,
    path: Path,
}

impl<'a> QueryContext<'a> {
    pub(crate) fn new(
        state: &'a Value,
        scope: Option<&'a CapabilityScope>,
        operators: &'a QueryOperatorTable,
    ) -> Self {
        Self {
            state,
            scope,
            operators,
            dependencies: IndexSet::new(),
            path: Path::root(),
        }
    }

    /// The whole state the query runs against.
    #[inline]
    pub fn state(&self) -> &'a Value {
        self.state
    }

    /// Path of the node currently being evaluated.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn scope(&self) -> Option<&'a CapabilityScope> {
        self.scope
    }

    /// Record `path` as a dependency.
    pub fn track(&mut self, path: Path) {
        self.dependencies.insert(path);
    }

    pub fn can_read(&self, path: &Path) -> bool {
        self.scope.map_or(true, |scope| scope.can_read(path))
    }

    /// Read the value at `path`, recording it as a dependency. Denied reads
    /// are absent.
    pub fn read(&mut self, path: &Path) -> Option<&'a Value> {
        self.track(path.clone());
        if !self.can_read(path) {
            return None;
        }
        access::get(self.state, path)
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &Path> {
        self.dependencies.iter()
    }

    pub(crate) fn into_dependencies(self) -> Vec<Path> {
        self.dependencies.into_iter().collect()
    }

    /// Evaluate a compiled plan against the whole state.
    pub(crate) fn run_plan(&mut self, plan: &QueryPlan) -> StoreResult<Value> {
        let state = self.state;
        let result = self.eval(&plan.root, &Path::root(), Some(state), true)?;
        Ok(result.unwrap_or(Value::Null))
    }

    fn eval(
        &mut self,
        node: &PlanNode,
        path: &Path,
        input: Option<&Value>,
        root: bool,
    ) -> StoreResult<Option<Value>> {
        match node {
            PlanNode::Literal(v) => Ok(Some(v.clone())),
            PlanNode::Pass => {
                self.track(path.clone());
                if self.can_read(path) {
                    Ok(input.cloned())
                } else {
                    Ok(None)
                }
            }
            PlanNode::Object(plan) if root && !plan.reads_self() => {
                let mut out = Map::new();
                for (key, child) in &plan.children {
                    let value = input.and_then(|v| child_value(v, key));
                    if let Some(result) = self.eval(child, &path.clone().key(key.as_str()), value, false)? {
                        out.insert(key.clone(), result);
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            PlanNode::Object(plan) => self.eval_object(plan, path, input),
        }
    }

    fn eval_object(
        &mut self,
        plan: &ObjectPlan,
        path: &Path,
        input: Option<&Value>,
    ) -> StoreResult<Option<Value>> {
        self.track(path.clone());
        let mut current = if self.can_read(path) { input.cloned() } else { None };

        for (name, arg) in &plan.directives {
            let op = self
                .operators
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| StoreError::unknown_query_operator(name, path.clone()))?;
            if let Some(value) = current.take() {
                self.path = path.clone();
                current = Some(op(arg, value, self)?);
            }
        }

        if let (Some(each), Some(Value::Array(items))) = (&plan.each, &current) {
            let mut mapped = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let result = self.eval(each, &path.clone().index(i), Some(item), false)?;
                mapped.push(result.unwrap_or(Value::Null));
            }
            current = Some(Value::Array(mapped));
        }

        if plan.children.is_empty() {
            return Ok(current);
        }
        match current {
            Some(Value::Array(items)) => {
                let mut projected = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    projected.push(self.project(&plan.children, &path.clone().index(i), item)?);
                }
                Ok(Some(Value::Array(projected)))
            }
            Some(other) => self.project(&plan.children, path, other).map(Some),
            None => {
                self.visit_children(&plan.children, path)?;
                Ok(None)
            }
        }
    }

    /// Merge declared children into a shallow copy of `source`.
    fn project(
        &mut self,
        children: &[(String, PlanNode)],
        path: &Path,
        source: Value,
    ) -> StoreResult<Value> {
        let Value::Object(mut out) = source else {
            self.visit_children(children, path)?;
            return Ok(source);
        };
        for (key, child) in children {
            let result = self.eval(child, &path.clone().key(key.as_str()), out.get(key), false)?;
            match result {
                Some(value) => {
                    out.insert(key.clone(), value);
                }
                None => {
                    out.shift_remove(key);
                }
            }
        }
        Ok(Value::Object(out))
    }

    /// Evaluate children against a missing value so their paths are tracked.
    fn visit_children(&mut self, children: &[(String, PlanNode)], path: &Path) -> StoreResult<()> {
        for (key, child) in children {
            self.eval(child, &path.clone().key(key.as_str()), None, false)?;
        }
        Ok(())
    }
}

fn child_value<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{builtin_query_operators, QuerySpec};
    use crate::path;
    use serde_json::json;

    fn run(state: &Value, spec: Value, scope: Option<&CapabilityScope>) -> (Value, Vec<Path>) {
        let operators = builtin_query_operators();
        let mut ctx = QueryContext::new(state, scope, &operators);
        let plan = QueryPlan::compile(&QuerySpec::from_json(spec));
        let value = ctx.run_plan(&plan).unwrap();
        (value, ctx.into_dependencies())
    }

    #[test]
    fn test_where_query() {
        let state = json!({"items": [{"id": 1, "done": false}, {"id": 2, "done": true}], "other": 1});
        let (value, deps) = run(&state, json!({"items": {"$where": {"done": {"$eq": true}}}}), None);
        assert_eq!(value, json!({"items": [{"id": 2, "done": true}]}));
        assert_eq!(deps, vec![path!("items")]);
    }

    #[test]
    fn test_root_with_directive_tracks_root() {
        let state = json!({"a": 1});
        let (_, deps) = run(&state, json!({"$select": ["a"]}), None);
        assert_eq!(deps, vec![Path::root()]);
    }

    #[test]
    fn test_children_merge_into_source() {
        let state = json!({"user": {"name": "ada", "age": 36, "tags": ["x", "y"]}});
        let (value, deps) = run(&state, json!({"user": {"tags": {"$limit": 1}}}), None);
        assert_eq!(value, json!({"user": {"name": "ada", "age": 36, "tags": ["x"]}}));
        assert!(deps.contains(&path!("user")));
        assert!(deps.contains(&path!("user", "tags")));
    }

    #[test]
    fn test_children_broadcast_over_arrays() {
        let state = json!({"rows": [{"xs": [1, 2, 3]}, {"xs": [4]}]});
        let (value, _) = run(&state, json!({"rows": {"xs": {"$limit": 1}}}), None);
        assert_eq!(value, json!({"rows": [{"xs": [1]}, {"xs": [4]}]}));
    }

    #[test]
    fn test_each_projects_elements() {
        let state = json!({"rows": [{"a": 1, "b": 2}, {"a": 3, "b": 4}]});
        let (value, _) = run(&state, json!({"rows": {"$each": {"$select": "a"}}}), None);
        assert_eq!(value, json!({"rows": [{"a": 1}, {"a": 3}]}));
    }

    #[test]
    fn test_denied_reads_are_absent_but_tracked() {
        let state = json!({"public": {"t": 1}, "secret": {"k": 2}});
        let scope = CapabilityScope::new().deny(path!("secret"));
        let (value, deps) = run(&state, json!({"public": true, "secret": true}), Some(&scope));
        assert_eq!(value, json!({"public": {"t": 1}}));
        assert!(deps.contains(&path!("secret")));
    }

    #[test]
    fn test_literals_and_missing_paths() {
        let state = json!({});
        let (value, deps) = run(&state, json!({"version": 2, "missing": {"x": true}}), None);
        assert_eq!(value, json!({"version": 2}));
        assert!(deps.contains(&path!("missing", "x")));
    }

    #[test]
    fn test_unknown_directive() {
        let state = json!({"a": []});
        let operators = builtin_query_operators();
        let mut ctx = QueryContext::new(&state, None, &operators);
        let plan = QueryPlan::compile(&QuerySpec::from_json(json!({"a": {"$frobnicate": 1}})));
        let err = ctx.run_plan(&plan).unwrap_err();
        assert!(matches!(err, StoreError::UnknownQueryOperator { ref name, .. } if name == "frobnicate"));
    }
}
