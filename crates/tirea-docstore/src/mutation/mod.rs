//! Mutation operators.
//!
//! An operator is a named handler invoked for every command of its kind. It
//! receives a [`MutationContext`] bound to the command's path and the
//! command payload. Every store starts with the built-in operators (`set`,
//! `merge`, `delete`, `move`, `link`, `unlink`); more can be registered per
//! store with `DocumentStore::register_mutation_operator`.

mod builtin;
mod context;
mod link;

pub use context::MutationContext;

use crate::error::StoreResult;
use crate::executor::OperatorTable;
use serde_json::Value;
use std::sync::Arc;

/// A registered mutation operator.
pub type MutationHandler =
    Arc<dyn Fn(&mut MutationContext<'_>, &Value) -> StoreResult<()> + Send + Sync>;

/// The operator table every store starts with.
pub(crate) fn builtin_operators() -> OperatorTable {
    let mut table = OperatorTable::new();
    table.insert("set".to_string(), Arc::new(builtin::set) as MutationHandler);
    table.insert("merge".to_string(), Arc::new(builtin::merge) as MutationHandler);
    table.insert("delete".to_string(), Arc::new(builtin::delete) as MutationHandler);
    table.insert("move".to_string(), Arc::new(builtin::move_op) as MutationHandler);
    table.insert("link".to_string(), Arc::new(builtin::link) as MutationHandler);
    table.insert("unlink".to_string(), Arc::new(builtin::unlink) as MutationHandler);
    table
}
