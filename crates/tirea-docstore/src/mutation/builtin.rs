//! Built-in operators.

use super::MutationContext;
use crate::{error::StoreResult, LinkSpec};
use serde_json::Value;

pub(super) fn set(ctx: &mut MutationContext<'_>, payload: &Value) -> StoreResult<()> {
    ctx.set(payload.clone())
}

pub(super) fn merge(ctx: &mut MutationContext<'_>, payload: &Value) -> StoreResult<()> {
    ctx.merge(payload.clone())
}

pub(super) fn delete(ctx: &mut MutationContext<'_>, _payload: &Value) -> StoreResult<()> {
    ctx.del()
}

pub(super) fn move_op(ctx: &mut MutationContext<'_>, payload: &Value) -> StoreResult<()> {
    match (payload.get("from"), payload.get("to")) {
        (Some(from), Some(to)) => ctx.move_item(from, to),
        _ => {
            tracing::debug!(path = %ctx.path(), "ignoring move without from/to");
            Ok(())
        }
    }
}

pub(super) fn link(ctx: &mut MutationContext<'_>, payload: &Value) -> StoreResult<()> {
    match link_spec(ctx, payload) {
        Some(spec) => ctx.link(&spec),
        None => Ok(()),
    }
}

pub(super) fn unlink(ctx: &mut MutationContext<'_>, payload: &Value) -> StoreResult<()> {
    match link_spec(ctx, payload) {
        Some(spec) => ctx.unlink(&spec),
        None => Ok(()),
    }
}

fn link_spec(ctx: &MutationContext<'_>, payload: &Value) -> Option<LinkSpec> {
    match serde_json::from_value::<LinkSpec>(payload.clone()) {
        Ok(spec) => Some(spec),
        Err(e) => {
            tracing::debug!(path = %ctx.path(), error = %e, "ignoring malformed link payload");
            None
        }
    }
}
