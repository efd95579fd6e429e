//! `link` / `unlink`: relation arrays between node records.
//!
//! Node records live under `nodes_path` (default `nodes`) as
//! `{id, links: {<relation>: [targets...]}}`.

use super::MutationContext;
use crate::{error::StoreResult, value::deep_equal, LinkSpec, Path};
use serde_json::{json, Value};

struct Resolved {
    nodes: Path,
    node_id: String,
    relation: String,
    mirror: Option<String>,
    targets: Vec<Value>,
}

fn resolve(ctx: &MutationContext<'_>, spec: &LinkSpec) -> Option<Resolved> {
    let Some(relation) = spec.relation.clone().filter(|r| !r.is_empty()) else {
        tracing::debug!(path = %ctx.path(), "ignoring link without relation");
        return None;
    };
    let Some(targets) = parse_targets(spec.to.as_ref()) else {
        tracing::debug!(path = %ctx.path(), "ignoring link with invalid targets");
        return None;
    };
    let nodes = match &spec.nodes_path {
        Some(raw) => Path::from_json(raw)?,
        None => Path::root().key("nodes"),
    };
    let node_id = spec
        .from
        .as_ref()
        .and_then(id_string)
        .or_else(|| ctx.get().and_then(|v| v.get("id")).and_then(id_string))
        .or_else(|| ctx.path().last().map(|seg| seg.object_key().into_owned()));
    let Some(node_id) = node_id else {
        tracing::debug!("ignoring link at the root without an explicit source");
        return None;
    };
    let mirror = if spec.bidirectional || spec.inverse_relation.is_some() {
        Some(spec.inverse_relation.clone().unwrap_or_else(|| relation.clone()))
    } else {
        None
    };
    Some(Resolved {
        nodes,
        node_id,
        relation,
        mirror,
        targets,
    })
}

/// `None` for an unusable target type, an empty list when no target is given.
fn parse_targets(raw: Option<&Value>) -> Option<Vec<Value>> {
    match raw {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(v @ (Value::String(_) | Value::Number(_))) => Some(vec![v.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(_) | Value::Number(_) => Some(item.clone()),
                _ => None,
            })
            .collect(),
        Some(_) => None,
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn relation_path(nodes: &Path, node_id: &str, relation: &str) -> Path {
    nodes.clone().key(node_id).key("links").key(relation)
}

pub(super) fn link(ctx: &mut MutationContext<'_>, spec: &LinkSpec) -> StoreResult<()> {
    let Some(r) = resolve(ctx, spec) else {
        return Ok(());
    };
    if r.targets.is_empty() {
        return Ok(());
    }
    add_links(ctx, &r.nodes, &r.node_id, &r.relation, &r.targets)?;
    if let Some(mirror) = &r.mirror {
        let source = [Value::String(r.node_id.clone())];
        for target in &r.targets {
            if let Some(target_id) = id_string(target) {
                add_links(ctx, &r.nodes, &target_id, mirror, &source)?;
            }
        }
    }
    Ok(())
}

pub(super) fn unlink(ctx: &mut MutationContext<'_>, spec: &LinkSpec) -> StoreResult<()> {
    let Some(r) = resolve(ctx, spec) else {
        return Ok(());
    };
    let removed = remove_links(ctx, &r.nodes, &r.node_id, &r.relation, &r.targets)?;
    if let Some(mirror) = &r.mirror {
        let source = [Value::String(r.node_id.clone())];
        for target in &removed {
            if let Some(target_id) = id_string(target) {
                remove_links(ctx, &r.nodes, &target_id, mirror, &source)?;
            }
        }
    }
    Ok(())
}

fn add_links(
    ctx: &mut MutationContext<'_>,
    nodes: &Path,
    node_id: &str,
    relation: &str,
    targets: &[Value],
) -> StoreResult<()> {
    let node_path = nodes.clone().key(node_id);
    if !ctx.get_at(&node_path).is_some_and(Value::is_object) {
        ctx.set_at(&node_path, json!({"id": node_id, "links": {}}))?;
    }

    let rel_path = relation_path(nodes, node_id, relation);
    let mut current = ctx
        .get_at(&rel_path)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let len = current.len();
    for target in targets {
        if !current.iter().any(|existing| deep_equal(existing, target)) {
            current.push(target.clone());
        }
    }
    if current.len() != len || !ctx.get_at(&rel_path).is_some_and(Value::is_array) {
        ctx.set_at(&rel_path, Value::Array(current))?;
    }
    Ok(())
}

/// Remove `targets` (every target when empty) and return what was removed.
fn remove_links(
    ctx: &mut MutationContext<'_>,
    nodes: &Path,
    node_id: &str,
    relation: &str,
    targets: &[Value],
) -> StoreResult<Vec<Value>> {
    let rel_path = relation_path(nodes, node_id, relation);
    let Some(current) = ctx.get_at(&rel_path).cloned() else {
        return Ok(Vec::new());
    };
    let current = match current {
        Value::Array(items) => items,
        _ => {
            ctx.del_at(&rel_path)?;
            return Ok(Vec::new());
        }
    };

    let (removed, kept): (Vec<Value>, Vec<Value>) = if targets.is_empty() {
        (current, Vec::new())
    } else {
        current
            .into_iter()
            .partition(|item| targets.iter().any(|t| deep_equal(item, t)))
    };
    if removed.is_empty() {
        return Ok(removed);
    }
    if kept.is_empty() {
        ctx.del_at(&rel_path)?;
    } else {
        ctx.set_at(&rel_path, Value::Array(kept))?;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use crate::executor::execute_patch;
    use crate::mutation::builtin_operators;
    use crate::{path, LinkSpec, MutationPatch};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn apply(state: Value, patch: MutationPatch) -> Value {
        execute_patch(Arc::new(state), &patch, Arc::new(builtin_operators()))
            .unwrap()
            .state
    }

    #[test]
    fn test_link_creates_node_record() {
        let state = apply(
            json!({}),
            MutationPatch::at(&path!("nodes", "a"), MutationPatch::link(LinkSpec::new("parent").to("b"))),
        );
        assert_eq!(
            state["nodes"]["a"],
            json!({"id": "a", "links": {"parent": ["b"]}})
        );
    }

    #[test]
    fn test_link_dedupes_targets() {
        let start = json!({"nodes": {"a": {"id": "a", "links": {"parent": ["b"]}}}});
        let state = apply(
            start,
            MutationPatch::at(
                &path!("nodes", "a"),
                MutationPatch::link(LinkSpec::new("parent").to("b").to("c")),
            ),
        );
        assert_eq!(state["nodes"]["a"]["links"]["parent"], json!(["b", "c"]));
    }

    #[test]
    fn test_bidirectional_link_mirrors() {
        let state = apply(
            json!({}),
            MutationPatch::at(
                &path!("nodes", "a"),
                MutationPatch::link(LinkSpec::new("child").to("b").inverse_relation("parent")),
            ),
        );
        assert_eq!(state["nodes"]["a"]["links"]["child"], json!(["b"]));
        assert_eq!(state["nodes"]["b"]["links"]["parent"], json!(["a"]));
    }

    #[test]
    fn test_unlink_removes_empty_relation() {
        let start = json!({"nodes": {"a": {"id": "a", "links": {"parent": ["b"]}}}});
        let state = apply(
            start,
            MutationPatch::at(&path!("nodes", "a"), MutationPatch::unlink(LinkSpec::new("parent").to("b"))),
        );
        assert_eq!(state["nodes"]["a"], json!({"id": "a", "links": {}}));
    }

    #[test]
    fn test_malformed_link_is_noop() {
        let start = json!({"nodes": {}});
        let patch = MutationPatch::from(json!({"x": {"$op": "link", "payload": {"to": "b"}}}));
        assert_eq!(apply(start.clone(), patch), start);

        let patch = MutationPatch::from(json!({"x": {"$op": "link", "payload": {"relation": "p", "to": {"bad": 1}}}}));
        assert_eq!(apply(start.clone(), patch), start);
    }

    #[test]
    fn test_explicit_source_and_nodes_path() {
        let state = apply(
            json!({}),
            MutationPatch::link(
                LinkSpec::new("owns")
                    .from("root")
                    .to(1)
                    .nodes_path(&path!("graph", "vertices")),
            ),
        );
        assert_eq!(
            state["graph"]["vertices"]["root"]["links"]["owns"],
            json!([1])
        );
    }
}
