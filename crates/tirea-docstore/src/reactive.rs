//! Live query subscriptions.
//!
//! The registry only holds bookkeeping; running a watcher needs the store
//! and lives in [`DocumentStore`](crate::DocumentStore). A watcher is
//! re-run after a commit when it has no recorded dependencies yet or when
//! one of its dependencies overlaps a changed path.

use crate::{
    error::StoreResult,
    query::{CapabilityScope, Query},
    store::StoreInner,
    value::deep_equal,
    DocumentStore, Path,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};

/// Receives every result a watcher decides to publish.
pub type QueryListener = Arc<dyn Fn(&Arc<Value>) + Send + Sync>;

/// Custom result comparison; `true` means "unchanged, do not notify".
pub type EqualityFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// How a watcher decides whether a re-run produced a new result.
#[derive(Clone, Default)]
pub enum Equality {
    /// Scalars compare by value; arrays and objects are equal only when they
    /// are the same allocation, so a rebuilt container always notifies.
    #[default]
    Identity,
    /// Deep structural equality.
    Structural,
    Custom(EqualityFn),
}

impl Equality {
    pub fn custom(f: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static) -> Self {
        Equality::Custom(Arc::new(f))
    }

    pub(crate) fn unchanged(&self, previous: &Arc<Value>, next: &Arc<Value>) -> bool {
        match self {
            Equality::Identity => {
                Arc::ptr_eq(previous, next)
                    || (!is_container(previous) && !is_container(next) && deep_equal(previous, next))
            }
            Equality::Structural => deep_equal(previous, next),
            Equality::Custom(f) => f(previous, next),
        }
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

impl fmt::Debug for Equality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Equality::Identity => f.write_str("Identity"),
            Equality::Structural => f.write_str("Structural"),
            Equality::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Options for [`DocumentStore::watch_query`](crate::DocumentStore::watch_query).
#[derive(Clone, Debug)]
pub struct WatchOptions {
    /// Call the listener with the initial result.
    pub fire_immediately: bool,
    pub equality: Equality,
    pub scope: Option<CapabilityScope>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            fire_immediately: true,
            equality: Equality::Identity,
            scope: None,
        }
    }
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire_immediately(mut self, fire: bool) -> Self {
        self.fire_immediately = fire;
        self
    }

    pub fn equality(mut self, equality: Equality) -> Self {
        self.equality = equality;
        self
    }

    pub fn structural(self) -> Self {
        self.equality(Equality::Structural)
    }

    pub fn scope(mut self, scope: CapabilityScope) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Why a watcher ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryRunReason {
    Initial,
    /// A commit touched one of its dependencies.
    Invalidated,
    QueryUpdated,
    Manual,
}

/// Emitted to `on_query_run` listeners after every successful watcher run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRunEvent {
    pub query_id: u64,
    pub reason: QueryRunReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    pub dependencies: Vec<Path>,
    /// Whether the listener was called.
    pub notified: bool,
}

/// Emitted to `on_invalidation` listeners before a watcher re-runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationEvent {
    pub query_id: u64,
    pub commit_id: String,
    /// The committed paths that overlap a dependency; empty when the watcher
    /// had no dependencies recorded.
    pub changed_paths: Vec<Path>,
    pub dependencies: Vec<Path>,
}

pub(crate) struct ActiveQuery {
    pub(crate) query: Query,
    pub(crate) listener: QueryListener,
    pub(crate) equality: Equality,
    pub(crate) scope: Option<CapabilityScope>,
    pub(crate) dependencies: Vec<Path>,
    pub(crate) last_result: Option<Arc<Value>>,
}

/// The live watchers of one store, in registration order.
#[derive(Default)]
pub(crate) struct ActiveQueries {
    next_id: u64,
    queries: IndexMap<u64, ActiveQuery>,
}

impl ActiveQueries {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, query: ActiveQuery) -> u64 {
        self.next_id += 1;
        self.queries.insert(self.next_id, query);
        self.next_id
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        self.queries.shift_remove(&id).is_some()
    }

    pub(crate) fn get(&self, id: u64) -> Option<&ActiveQuery> {
        self.queries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: u64) -> Option<&mut ActiveQuery> {
        self.queries.get_mut(&id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Watchers affected by `changed`, each with the overlapping paths.
    pub(crate) fn invalidated_by(&self, changed: &[Path]) -> Vec<(u64, Vec<Path>, Vec<Path>)> {
        self.queries
            .iter()
            .filter_map(|(id, active)| {
                let hits = overlapping(&active.dependencies, changed)?;
                Some((*id, hits, active.dependencies.clone()))
            })
            .collect()
    }
}

/// `None` when nothing overlaps. Empty dependencies always match.
pub(crate) fn overlapping(dependencies: &[Path], changed: &[Path]) -> Option<Vec<Path>> {
    if dependencies.is_empty() {
        return Some(Vec::new());
    }
    let hits: Vec<Path> = changed
        .iter()
        .filter(|c| dependencies.iter().any(|d| d.overlaps(c)))
        .cloned()
        .collect();
    (!hits.is_empty()).then_some(hits)
}

/// Handle to a live watcher. Holds the store weakly.
pub struct WatchHandle {
    id: u64,
    store: Weak<StoreInner>,
}

impl WatchHandle {
    pub(crate) fn new(id: u64, store: Weak<StoreInner>) -> Self {
        Self { id, store }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn store(&self) -> Option<DocumentStore> {
        self.store.upgrade().map(DocumentStore::from_inner)
    }

    /// The last published or computed result.
    pub fn get_current(&self) -> Option<Arc<Value>> {
        self.store()?.watch_result(self.id)
    }

    /// Current dependency set.
    pub fn dependencies(&self) -> Vec<Path> {
        self.store()
            .map(|store| store.watch_dependencies(self.id))
            .unwrap_or_default()
    }

    /// Swap the query and re-run it.
    pub fn update(&self, query: impl Into<Query>) -> StoreResult<()> {
        match self.store() {
            Some(store) => store.update_watch(self.id, query.into()),
            None => Ok(()),
        }
    }

    /// Force a re-run.
    pub fn run(&self) -> StoreResult<()> {
        match self.store() {
            Some(store) => store.run_watch(self.id, QueryRunReason::Manual, None, false),
            None => Ok(()),
        }
    }

    pub fn unsubscribe(self) {
        if let Some(store) = self.store() {
            store.remove_watch(self.id);
        }
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_overlap_rules() {
        let deps = vec![path!("items"), path!("meta", "title")];
        assert_eq!(
            overlapping(&deps, &[path!("items", 0, "done")]),
            Some(vec![path!("items", 0, "done")])
        );
        assert!(overlapping(&deps, &[path!("meta")]).is_some());
        assert!(overlapping(&deps, &[path!("meta", "author")]).is_none());
        assert_eq!(overlapping(&[], &[path!("anything")]), Some(Vec::new()));
    }

    #[test]
    fn test_equality_modes() {
        let a = Arc::new(json!({"x": 1}));
        let b = Arc::new(json!({"x": 1}));
        assert!(!Equality::Identity.unchanged(&a, &b));
        assert!(Equality::Identity.unchanged(&a, &a));
        assert!(Equality::Structural.unchanged(&a, &b));
        assert!(Equality::Identity.unchanged(&Arc::new(json!(2)), &Arc::new(json!(2.0))));
        assert!(Equality::Identity.unchanged(&Arc::new(json!(null)), &Arc::new(json!(null))));
        assert!(!Equality::Identity.unchanged(&Arc::new(json!("a")), &Arc::new(json!("b"))));
        assert!(!Equality::Identity.unchanged(&Arc::new(json!([])), &Arc::new(json!([]))));
        let never = Equality::custom(|_, _| false);
        assert!(!never.unchanged(&a, &a));
    }
}
