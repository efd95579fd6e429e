//! Declarative queries.
//!
//! A [`Query`] is either a [`QuerySpec`] tree or a resolver function. Specs
//! compile once per allocation into a [`QueryPlan`]; evaluation walks the
//! plan, applies `$`-directives through the store's query operator table and
//! records every path it visits so reactive watchers know when to re-run.
//!
//! ```
//! use tirea_docstore::{DocumentStore, query::Query};
//! use serde_json::json;
//!
//! let store = DocumentStore::new(json!({
//!     "items": [{"id": 1, "done": false}, {"id": 2, "done": true}],
//! })).unwrap();
//!
//! let done = store
//!     .query(&Query::from_json(json!({"items": {"$where": {"done": {"$eq": true}}}})), None)
//!     .unwrap();
//! assert_eq!(done, json!({"items": [{"id": 2, "done": true}]}));
//! ```

mod eval;
mod filter;
mod ops;
mod plan;
mod scope;
mod spec;

pub use eval::{QueryContext, QueryOperator};
pub use filter::{Comparison, FieldMatch, WhereClause};
pub use plan::QueryPlan;
pub use scope::CapabilityScope;
pub use spec::{Comparator, Mapper, Predicate, Query, QueryArg, QueryEntry, QuerySpec, Resolver};

pub(crate) use eval::QueryOperatorTable;
pub(crate) use ops::builtin_query_operators;
pub(crate) use plan::QueryCompiler;

use crate::{error::StoreResult, Path};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};

/// A query result together with the paths it read.
#[derive(Debug, Clone)]
pub(crate) struct QueryOutput {
    pub(crate) value: Value,
    pub(crate) dependencies: Vec<Path>,
}

/// Evaluate `query` against `state`.
pub(crate) fn run_query(
    query: &Query,
    compiler: &Mutex<QueryCompiler>,
    operators: &QueryOperatorTable,
    state: &Value,
    scope: Option<&CapabilityScope>,
) -> StoreResult<QueryOutput> {
    let mut ctx = QueryContext::new(state, scope, operators);
    let value = match query {
        Query::Spec(spec) => {
            let plan = compiler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .compile(spec);
            ctx.run_plan(&plan)?
        }
        Query::Resolver(resolve) => resolve(state, &mut ctx)?,
    };
    let dependencies = ctx.into_dependencies();
    tracing::trace!(dependencies = dependencies.len(), "query evaluated");
    Ok(QueryOutput {
        value,
        dependencies,
    })
}
