//! The document store.
//!
//! All state changes go through [`DocumentStore::commit`]:
//! - the patch runs against a scratch copy and either applies fully or not at all
//! - every applied patch becomes an immutable [`CommitRecord`] with its inverse
//! - history channels, listeners and live queries are updated from the record

use crate::{
    change::CommitDiff,
    commit::{build_event, CommitOptions, CommitRecord, CommitSource, GraphEvent, HistoryMode},
    config::StoreConfig,
    error::{StoreError, StoreResult},
    executor::execute_patch,
    history::{HistoryChannelState, HistoryChannels, HistoryEntry},
    intent::{DispatchOptions, IntentContext, IntentOutput, IntentProducer},
    inverse::build_inverse,
    mutation::{self, MutationContext, MutationHandler},
    query::{self, CapabilityScope, Query, QueryArg, QueryCompiler, QueryContext, QueryOperator},
    reactive::{
        ActiveQueries, ActiveQuery, InvalidationEvent, QueryRunEvent, QueryRunReason, WatchHandle,
        WatchOptions,
    },
    registry::{Listeners, Registry, Subscription},
    MutationPatch, Path,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

type CommitListener = dyn Fn(&Arc<CommitRecord>) + Send + Sync;
type StateListener = dyn Fn(&Arc<Value>) + Send + Sync;
type EventListener = dyn Fn(&GraphEvent) + Send + Sync;
type QueryRunListener = dyn Fn(&QueryRunEvent) + Send + Sync;
type InvalidationListener = dyn Fn(&InvalidationEvent) + Send + Sync;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn new_id() -> String {
    Uuid::now_v7().simple().to_string()
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Default)]
struct CommitLog {
    records: VecDeque<Arc<CommitRecord>>,
    last_index: u64,
}

struct StoreListeners {
    commit: Listeners<CommitListener>,
    state: Listeners<StateListener>,
    event: Listeners<EventListener>,
    query_run: Listeners<QueryRunListener>,
    invalidation: Listeners<InvalidationListener>,
}

impl StoreListeners {
    fn new() -> Self {
        Self {
            commit: Listeners::new(),
            state: Listeners::new(),
            event: Listeners::new(),
            query_run: Listeners::new(),
            invalidation: Listeners::new(),
        }
    }
}

pub(crate) struct StoreInner {
    config: StoreConfig,
    /// Serializes patch execution and the state swap.
    commit_lock: Mutex<()>,
    state: Mutex<Arc<Value>>,
    log: Mutex<CommitLog>,
    history: Mutex<HistoryChannels>,
    operators: Mutex<Registry<MutationHandler>>,
    query_operators: Mutex<Registry<QueryOperator>>,
    intents: Mutex<Registry<IntentProducer>>,
    compiler: Mutex<QueryCompiler>,
    queries: Mutex<ActiveQueries>,
    listeners: Mutex<StoreListeners>,
}

/// Which history entry an undo or redo must find on top of its stack.
#[derive(Clone, Debug)]
pub enum HistoryTarget {
    Commit(String),
    /// Also selects the record's channel when none is given.
    Record(Arc<CommitRecord>),
}

impl From<&str> for HistoryTarget {
    fn from(id: &str) -> Self {
        HistoryTarget::Commit(id.to_string())
    }
}

impl From<String> for HistoryTarget {
    fn from(id: String) -> Self {
        HistoryTarget::Commit(id)
    }
}

impl From<Arc<CommitRecord>> for HistoryTarget {
    fn from(record: Arc<CommitRecord>) -> Self {
        HistoryTarget::Record(record)
    }
}

impl From<&Arc<CommitRecord>> for HistoryTarget {
    fn from(record: &Arc<CommitRecord>) -> Self {
        HistoryTarget::Record(Arc::clone(record))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Replay {
    Undo,
    Redo,
}

/// In-process document store.
///
/// A cheap-to-clone handle; clones share the same state, history,
/// registries and listeners. No internal lock is held while listeners,
/// resolvers or intent producers run, so callbacks may call back into the
/// store.
///
/// ```
/// use tirea_docstore::{CommitOptions, DocumentStore, MutationPatch};
/// use serde_json::json;
///
/// let store = DocumentStore::new(json!({"count": 0})).unwrap();
/// let record = store
///     .commit(MutationPatch::from(json!({"count": 1})), CommitOptions::new())
///     .unwrap();
/// assert_eq!(store.state()["count"], 1);
///
/// store.undo(None, None).unwrap();
/// assert_eq!(store.state()["count"], 0);
/// assert_eq!(record.index, 1);
/// ```
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
}

impl DocumentStore {
    pub fn new(initial: Value) -> StoreResult<Self> {
        Self::with_config(initial, StoreConfig::default())
    }

    /// Create a store; `initial` must be an object.
    pub fn with_config(initial: Value, config: StoreConfig) -> StoreResult<Self> {
        if !initial.is_object() {
            return Err(StoreError::root_shape(&initial));
        }
        Ok(Self::build(initial, config))
    }

    fn build(initial: Value, config: StoreConfig) -> Self {
        let mut operators = Registry::new();
        for (name, handler) in mutation::builtin_operators() {
            operators.register(name, handler);
        }
        let mut query_operators = Registry::new();
        for (name, op) in query::builtin_query_operators() {
            query_operators.register(name, op);
        }
        let history = HistoryChannels::new(config.max_commits, config.default_history_channel.clone());
        Self {
            inner: Arc::new(StoreInner {
                config,
                commit_lock: Mutex::new(()),
                state: Mutex::new(Arc::new(initial)),
                log: Mutex::new(CommitLog::default()),
                history: Mutex::new(history),
                operators: Mutex::new(operators),
                query_operators: Mutex::new(query_operators),
                intents: Mutex::new(Registry::new()),
                compiler: Mutex::new(QueryCompiler::new()),
                queries: Mutex::new(ActiveQueries::new()),
                listeners: Mutex::new(StoreListeners::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The current immutable state.
    pub fn state(&self) -> Arc<Value> {
        Arc::clone(&lock(&self.inner.state))
    }

    // ------------------------------------------------------------------
    // Commits
    // ------------------------------------------------------------------

    /// Apply `patch` and record it.
    ///
    /// On error the state is untouched and nothing is recorded.
    pub fn commit(
        &self,
        patch: impl Into<MutationPatch>,
        options: CommitOptions,
    ) -> StoreResult<Arc<CommitRecord>> {
        let patch = patch.into();
        let inner = &self.inner;

        let mut record = {
            let _guard = lock(&inner.commit_lock);
            let original = self.state();
            let operators = Arc::new(lock(&inner.operators).snapshot());
            let outcome = match execute_patch(Arc::clone(&original), &patch, operators) {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::warn!(error = %error, "patch rejected");
                    return Err(error);
                }
            };

            let diff = CommitDiff::from_changes(&outcome.changes);
            let inverse_patch = build_inverse(&original, &outcome.changes);
            let changed_paths: Vec<Path> = outcome.changes.iter().map(|c| c.path.clone()).collect();
            let source = options.source.clone().unwrap_or_default();
            let history_channel = {
                let history = lock(&inner.history);
                match &options.history {
                    HistoryMode::Skip => None,
                    HistoryMode::Record => Some(history.normalize(None)),
                    HistoryMode::Channel(name) => Some(history.normalize(Some(name))),
                }
            };

            let state = Arc::new(outcome.state);
            *lock(&inner.state) = Arc::clone(&state);
            let index = {
                let mut log = lock(&inner.log);
                log.last_index += 1;
                log.last_index
            };

            let record = CommitRecord {
                id: new_id(),
                index,
                at: now_millis(),
                source,
                patch,
                inverse_patch,
                diff,
                changes: outcome.changes,
                changed_paths,
                metadata: options.metadata.clone(),
                intent: options.intent.clone(),
                history_channel,
                event: None,
                state,
            };
            if let (Some(channel), Some(inverse)) = (&record.history_channel, &record.inverse_patch) {
                if !record.source.is_history_replay() {
                    lock(&inner.history).record(
                        channel,
                        HistoryEntry {
                            commit_id: record.id.clone(),
                            forward_patch: record.patch.clone(),
                            inverse_patch: inverse.clone(),
                        },
                    );
                }
            }
            record
        };

        let observed = !lock(&inner.listeners).event.is_empty();
        if options.wants_event(inner.config.event_mode, observed) {
            record.event = build_event(&record, options.event.as_ref(), new_id());
        }

        let record = Arc::new(record);
        self.append_log(Arc::clone(&record));
        tracing::debug!(
            commit_id = %record.id,
            index = record.index,
            source = %record.source,
            changes = record.changes.len(),
            "commit applied"
        );
        self.notify(&record);
        Ok(record)
    }

    /// Commit data that originates outside the store (persistence, sync).
    pub fn materialize_external_patch(
        &self,
        patch: impl Into<MutationPatch>,
        metadata: Option<Value>,
    ) -> StoreResult<Arc<CommitRecord>> {
        let mut options = CommitOptions::new()
            .source(CommitSource::External)
            .emit_event(false);
        options.metadata = metadata;
        self.commit(patch, options)
    }

    fn append_log(&self, record: Arc<CommitRecord>) {
        let max = self.inner.config.max_commits;
        let mut log = lock(&self.inner.log);
        let at = log.records.partition_point(|r| r.index < record.index);
        log.records.insert(at, record);
        while log.records.len() > max {
            log.records.pop_front();
        }
    }

    fn notify(&self, record: &Arc<CommitRecord>) {
        let (commit, state, event) = {
            let listeners = lock(&self.inner.listeners);
            (
                listeners.commit.snapshot(),
                listeners.state.snapshot(),
                listeners.event.snapshot(),
            )
        };
        for listener in &commit {
            listener(record);
        }
        for listener in &state {
            listener(&record.state);
        }
        if let Some(graph_event) = &record.event {
            for listener in &event {
                listener(graph_event);
            }
        }
        if !record.changed_paths.is_empty() {
            self.invalidate(record);
        }
    }

    /// The bounded commit log, oldest first.
    pub fn commit_log(&self) -> Vec<Arc<CommitRecord>> {
        lock(&self.inner.log).records.iter().cloned().collect()
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn can_undo(&self, channel: Option<&str>) -> bool {
        let history = lock(&self.inner.history);
        history.can_undo(&history.normalize(channel))
    }

    pub fn can_redo(&self, channel: Option<&str>) -> bool {
        let history = lock(&self.inner.history);
        history.can_redo(&history.normalize(channel))
    }

    /// A copy of one channel's stacks; empty for channels never used.
    pub fn history(&self, channel: Option<&str>) -> HistoryChannelState {
        let history = lock(&self.inner.history);
        history
            .channel(&history.normalize(channel))
            .cloned()
            .unwrap_or_default()
    }

    /// Revert the newest step of a channel.
    ///
    /// Returns `None` without touching anything when the channel is empty or
    /// its top entry is not `target`.
    pub fn undo(
        &self,
        target: Option<HistoryTarget>,
        channel: Option<&str>,
    ) -> StoreResult<Option<Arc<CommitRecord>>> {
        self.replay(Replay::Undo, target, channel)
    }

    /// Re-apply the newest undone step of a channel.
    pub fn redo(
        &self,
        target: Option<HistoryTarget>,
        channel: Option<&str>,
    ) -> StoreResult<Option<Arc<CommitRecord>>> {
        self.replay(Replay::Redo, target, channel)
    }

    fn replay(
        &self,
        direction: Replay,
        target: Option<HistoryTarget>,
        channel: Option<&str>,
    ) -> StoreResult<Option<Arc<CommitRecord>>> {
        let (target_id, record_channel) = match &target {
            Some(HistoryTarget::Commit(id)) => (Some(id.as_str()), None),
            Some(HistoryTarget::Record(record)) => {
                (Some(record.id.as_str()), record.history_channel.as_deref())
            }
            None => (None, None),
        };

        // The entry changes stacks before the commit runs so listeners that
        // re-enter undo/redo see the next step.
        let (channel, entry) = {
            let mut history = lock(&self.inner.history);
            let channel = history.normalize(channel.or(record_channel));
            let entry = match direction {
                Replay::Undo => history.peek_undo(&channel, target_id),
                Replay::Redo => history.peek_redo(&channel, target_id),
            };
            if let Some(entry) = &entry {
                match direction {
                    Replay::Undo => history.complete_undo(&channel, &entry.commit_id),
                    Replay::Redo => history.complete_redo(&channel, &entry.commit_id),
                };
            }
            (channel, entry)
        };
        let Some(entry) = entry else {
            return Ok(None);
        };

        let (patch, source) = match direction {
            Replay::Undo => (entry.inverse_patch, CommitSource::Undo),
            Replay::Redo => (entry.forward_patch, CommitSource::Redo),
        };
        let result = self.commit(
            patch,
            CommitOptions::new()
                .source(source)
                .skip_history()
                .emit_event(false),
        );
        if result.is_err() {
            let mut history = lock(&self.inner.history);
            match direction {
                Replay::Undo => history.complete_redo(&channel, &entry.commit_id),
                Replay::Redo => history.complete_undo(&channel, &entry.commit_id),
            };
        }
        result.map(Some)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Evaluate `query` against the current state.
    pub fn query(&self, query: &Query, scope: Option<&CapabilityScope>) -> StoreResult<Value> {
        let state = self.state();
        self.evaluate(query, &state, scope).map(|out| out.value)
    }

    fn evaluate(
        &self,
        query: &Query,
        state: &Value,
        scope: Option<&CapabilityScope>,
    ) -> StoreResult<query::QueryOutput> {
        let operators = lock(&self.inner.query_operators).snapshot();
        query::run_query(query, &self.inner.compiler, &operators, state, scope)
    }

    /// Register a live query. It runs once now and again after every commit
    /// that touches what it read.
    pub fn watch_query(
        &self,
        query: impl Into<Query>,
        listener: impl Fn(&Arc<Value>) + Send + Sync + 'static,
        options: WatchOptions,
    ) -> StoreResult<WatchHandle> {
        let id = lock(&self.inner.queries).insert(ActiveQuery {
            query: query.into(),
            listener: Arc::new(listener),
            equality: options.equality,
            scope: options.scope,
            dependencies: Vec::new(),
            last_result: None,
        });
        if let Err(error) = self.run_watch(id, QueryRunReason::Initial, None, options.fire_immediately)
        {
            lock(&self.inner.queries).remove(id);
            return Err(error);
        }
        Ok(WatchHandle::new(id, Arc::downgrade(&self.inner)))
    }

    /// Run watcher `id` and publish its result.
    ///
    /// `fire_initial` only matters for the initial run; later runs notify
    /// when the watcher's equality says the result changed.
    pub(crate) fn run_watch(
        &self,
        id: u64,
        reason: QueryRunReason,
        commit_id: Option<&str>,
        fire_initial: bool,
    ) -> StoreResult<()> {
        let (query, scope) = {
            let queries = lock(&self.inner.queries);
            let Some(active) = queries.get(id) else {
                return Ok(());
            };
            (active.query.clone(), active.scope.clone())
        };

        let state = self.state();
        let output = self.evaluate(&query, &state, scope.as_ref())?;
        let result = Arc::new(output.value);

        let (notify, listener) = {
            let mut queries = lock(&self.inner.queries);
            let Some(active) = queries.get_mut(id) else {
                return Ok(());
            };
            let unchanged = active
                .last_result
                .as_ref()
                .is_some_and(|previous| active.equality.unchanged(previous, &result));
            let notify = match reason {
                QueryRunReason::Initial => fire_initial,
                _ => !unchanged,
            };
            if !unchanged {
                active.last_result = Some(Arc::clone(&result));
            }
            active.dependencies = output.dependencies.clone();
            (notify, Arc::clone(&active.listener))
        };

        let run_listeners = lock(&self.inner.listeners).query_run.snapshot();
        if !run_listeners.is_empty() {
            let event = QueryRunEvent {
                query_id: id,
                reason,
                commit_id: commit_id.map(str::to_string),
                dependencies: output.dependencies,
                notified: notify,
            };
            for l in &run_listeners {
                l(&event);
            }
        }
        if notify {
            listener(&result);
        }
        Ok(())
    }

    fn invalidate(&self, record: &CommitRecord) {
        let affected = {
            let queries = lock(&self.inner.queries);
            if queries.is_empty() {
                return;
            }
            queries.invalidated_by(&record.changed_paths)
        };
        for (id, changed_paths, dependencies) in affected {
            let listeners = lock(&self.inner.listeners).invalidation.snapshot();
            let event = InvalidationEvent {
                query_id: id,
                commit_id: record.id.clone(),
                changed_paths,
                dependencies,
            };
            for listener in &listeners {
                listener(&event);
            }
            if let Err(error) =
                self.run_watch(id, QueryRunReason::Invalidated, Some(&record.id), false)
            {
                tracing::warn!(
                    query_id = id,
                    commit_id = %record.id,
                    error = %error,
                    "watcher re-run failed, keeping previous result"
                );
            }
        }
    }

    pub(crate) fn update_watch(&self, id: u64, query: Query) -> StoreResult<()> {
        match lock(&self.inner.queries).get_mut(id) {
            Some(active) => active.query = query,
            None => return Ok(()),
        }
        self.run_watch(id, QueryRunReason::QueryUpdated, None, false)
            .inspect_err(|error| {
                tracing::warn!(query_id = id, error = %error, "watcher update failed");
            })
    }

    pub(crate) fn watch_result(&self, id: u64) -> Option<Arc<Value>> {
        lock(&self.inner.queries).get(id)?.last_result.clone()
    }

    pub(crate) fn watch_dependencies(&self, id: u64) -> Vec<Path> {
        lock(&self.inner.queries)
            .get(id)
            .map(|active| active.dependencies.clone())
            .unwrap_or_default()
    }

    pub(crate) fn remove_watch(&self, id: u64) {
        lock(&self.inner.queries).remove(id);
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register (or replace) a mutation operator for this store.
    pub fn register_mutation_operator(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&mut MutationContext<'_>, &Value) -> StoreResult<()> + Send + Sync + 'static,
    ) -> Subscription {
        let name = name.into();
        let token = lock(&self.inner.operators).register(name.clone(), Arc::new(handler));
        self.registration(name, token, |inner| &inner.operators)
    }

    /// Register (or replace) a `$`-directive. `name` is given without the
    /// sigil.
    pub fn register_query_operator(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&QueryArg, Value, &mut QueryContext<'_>) -> StoreResult<Value>
            + Send
            + Sync
            + 'static,
    ) -> Subscription {
        let name = name.into();
        let name = name.strip_prefix('$').map(str::to_string).unwrap_or(name);
        let token = lock(&self.inner.query_operators).register(name.clone(), Arc::new(handler));
        self.registration(name, token, |inner| &inner.query_operators)
    }

    pub fn register_intent(
        &self,
        name: impl Into<String>,
        producer: impl Fn(&Value, &IntentContext<'_>) -> Option<IntentOutput> + Send + Sync + 'static,
    ) -> Subscription {
        let name = name.into();
        let token = lock(&self.inner.intents).register(name.clone(), Arc::new(producer));
        self.registration(name, token, |inner| &inner.intents)
    }

    fn registration<H: Clone + 'static>(
        &self,
        name: String,
        token: u64,
        table: fn(&StoreInner) -> &Mutex<Registry<H>>,
    ) -> Subscription {
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(table(&inner)).unregister(&name, token);
            }
        })
    }

    /// Run intent `name` and commit what it produces.
    ///
    /// `Ok(None)` when no producer is registered or the producer declines.
    pub fn dispatch_intent(
        &self,
        name: &str,
        payload: impl Into<Value>,
        options: DispatchOptions,
    ) -> StoreResult<Option<Arc<CommitRecord>>> {
        let Some(producer) = lock(&self.inner.intents).get(name) else {
            tracing::debug!(intent = name, "no producer registered");
            return Ok(None);
        };
        let payload = payload.into();
        let output = {
            let ctx = IntentContext::new(self);
            producer(&payload, &ctx)
        };
        let Some(output) = output else {
            return Ok(None);
        };
        let options = options.into_commit_options(name, &payload, output.metadata, output.event);
        self.commit(output.patch, options).map(Some)
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    pub fn on_commit(
        &self,
        listener: impl Fn(&Arc<CommitRecord>) + Send + Sync + 'static,
    ) -> Subscription {
        let id = lock(&self.inner.listeners).commit.add(Arc::new(listener));
        self.listener_subscription(id, |l| &mut l.commit)
    }

    /// Called with the new state after every commit.
    pub fn on_state(&self, listener: impl Fn(&Arc<Value>) + Send + Sync + 'static) -> Subscription {
        let id = lock(&self.inner.listeners).state.add(Arc::new(listener));
        self.listener_subscription(id, |l| &mut l.state)
    }

    /// Attaching an event listener turns on events in `WhenObserved` mode.
    pub fn on_event(&self, listener: impl Fn(&GraphEvent) + Send + Sync + 'static) -> Subscription {
        let id = lock(&self.inner.listeners).event.add(Arc::new(listener));
        self.listener_subscription(id, |l| &mut l.event)
    }

    pub fn on_query_run(
        &self,
        listener: impl Fn(&QueryRunEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = lock(&self.inner.listeners).query_run.add(Arc::new(listener));
        self.listener_subscription(id, |l| &mut l.query_run)
    }

    pub fn on_invalidation(
        &self,
        listener: impl Fn(&InvalidationEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = lock(&self.inner.listeners).invalidation.add(Arc::new(listener));
        self.listener_subscription(id, |l| &mut l.invalidation)
    }

    fn listener_subscription<T: ?Sized + 'static>(
        &self,
        id: u64,
        list: fn(&mut StoreListeners) -> &mut Listeners<T>,
    ) -> Subscription {
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                list(&mut lock(&inner.listeners)).remove(id);
            }
        })
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::build(Value::Object(Default::default()), StoreConfig::default())
    }
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last_index = lock(&self.inner.log).last_index;
        f.debug_struct("DocumentStore")
            .field("config", &self.inner.config)
            .field("last_index", &last_index)
            .finish_non_exhaustive()
    }
}
