//! Query plans and the compile cache.

use super::{QueryArg, QueryEntry, QuerySpec, WhereClause};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// A compiled node.
#[derive(Clone, Debug)]
pub(crate) enum PlanNode {
    Pass,
    Literal(serde_json::Value),
    Object(ObjectPlan),
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ObjectPlan {
    /// Applied left to right.
    pub(crate) directives: Vec<(String, QueryArg)>,
    pub(crate) each: Option<Box<PlanNode>>,
    pub(crate) children: Vec<(String, PlanNode)>,
}

impl ObjectPlan {
    /// Whether the node transforms its own value rather than only projecting.
    pub(crate) fn reads_self(&self) -> bool {
        !self.directives.is_empty() || self.each.is_some()
    }
}

/// The compiled form of a [`QuerySpec`].
#[derive(Clone, Debug)]
pub struct QueryPlan {
    pub(crate) root: PlanNode,
}

impl QueryPlan {
    pub fn compile(spec: &QuerySpec) -> Self {
        Self {
            root: compile_node(spec),
        }
    }
}

fn compile_node(spec: &QuerySpec) -> PlanNode {
    match spec {
        QuerySpec::Pass => PlanNode::Pass,
        QuerySpec::Literal(v) => PlanNode::Literal(v.clone()),
        QuerySpec::Object(entries) => {
            let mut plan = ObjectPlan::default();
            for entry in entries {
                match entry {
                    QueryEntry::Directive { name, arg } => {
                        plan.directives.push((name.clone(), compile_arg(name, arg)))
                    }
                    QueryEntry::Each(each) => plan.each = Some(Box::new(compile_node(each))),
                    QueryEntry::Child { key, spec } => {
                        plan.children.push((key.clone(), compile_node(spec)))
                    }
                }
            }
            PlanNode::Object(plan)
        }
    }
}

/// JSON `where` descriptors are parsed here so cached plans never re-parse
/// them. A malformed descriptor stays raw and fails when evaluated.
fn compile_arg(name: &str, arg: &QueryArg) -> QueryArg {
    match arg {
        QueryArg::Value(descriptor) if name == "where" => {
            WhereClause::from_json(descriptor.clone())
                .map(QueryArg::Where)
                .unwrap_or_else(|_| arg.clone())
        }
        _ => arg.clone(),
    }
}

/// Compiles each spec allocation once.
///
/// Entries are keyed by the `Arc<QuerySpec>` allocation and hold it weakly,
/// so a dropped spec frees its plan on the next insert.
#[derive(Default)]
pub(crate) struct QueryCompiler {
    cache: HashMap<usize, (Weak<QuerySpec>, Arc<QueryPlan>)>,
}

impl QueryCompiler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn compile(&mut self, spec: &Arc<QuerySpec>) -> Arc<QueryPlan> {
        let key = Arc::as_ptr(spec) as usize;
        if let Some((weak, plan)) = self.cache.get(&key) {
            if weak.upgrade().is_some_and(|live| Arc::ptr_eq(&live, spec)) {
                return Arc::clone(plan);
            }
        }
        self.cache.retain(|_, (weak, _)| weak.strong_count() > 0);
        let plan = Arc::new(QueryPlan::compile(spec));
        self.cache
            .insert(key, (Arc::downgrade(spec), Arc::clone(&plan)));
        plan
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.cache.len()
    }
}
