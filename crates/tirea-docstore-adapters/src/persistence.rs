//! Debounced snapshot persistence bound to a [`DocumentStore`].

use crate::{PersistError, SnapshotStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tirea_docstore::{DocumentStore, SnapshotStrategy, Subscription};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Called with every failed load or save, after it has been logged.
pub type ErrorCallback = Arc<dyn Fn(&PersistError) + Send + Sync>;

/// How and when snapshots are written.
#[derive(Debug, Clone)]
pub struct PersistenceOptions {
    pub strategy: SnapshotStrategy,
    /// Trailing commits kept by a `Commits` snapshot. `None` keeps the whole log.
    pub max_commits: Option<usize>,
    /// Quiet period after the last commit before a save starts.
    pub debounce: Duration,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self {
            strategy: SnapshotStrategy::State,
            max_commits: None,
            debounce: Duration::from_millis(250),
        }
    }
}

impl PersistenceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn strategy(mut self, strategy: SnapshotStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn max_commits(mut self, max: usize) -> Self {
        self.max_commits = Some(max);
        self
    }

    #[must_use]
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Saves a store's snapshot after commits settle and restores it on load.
///
/// At most one save runs at a time. Commits that land during a save mark the
/// adapter dirty and schedule exactly one follow-up save once it finishes.
#[derive(Clone)]
pub struct PersistenceAdapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    store: DocumentStore,
    snapshots: Arc<dyn SnapshotStore>,
    options: PersistenceOptions,
    on_error: Mutex<Option<ErrorCallback>>,
    runtime: Mutex<Option<Handle>>,
    pending: Mutex<Option<JoinHandle<()>>>,
    subscription: Mutex<Option<Subscription>>,
    in_flight: AtomicBool,
    dirty: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl PersistenceAdapter {
    pub fn new(
        store: DocumentStore,
        snapshots: Arc<dyn SnapshotStore>,
        options: PersistenceOptions,
    ) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                store,
                snapshots,
                options,
                on_error: Mutex::new(None),
                runtime: Mutex::new(None),
                pending: Mutex::new(None),
                subscription: Mutex::new(None),
                in_flight: AtomicBool::new(false),
                dirty: AtomicBool::new(false),
            }),
        }
    }

    /// Report failures to `callback` as well as the log.
    pub fn on_error(&self, callback: impl Fn(&PersistError) + Send + Sync + 'static) {
        *lock(&self.inner.on_error) = Some(Arc::new(callback));
    }

    pub fn options(&self) -> &PersistenceOptions {
        &self.inner.options
    }

    /// Restore the stored snapshot into the store.
    ///
    /// Returns `false` when nothing is stored, the snapshot is invalid, or
    /// the store could not be read.
    pub async fn load(&self) -> bool {
        match self.inner.snapshots.load().await {
            Ok(Some(text)) => {
                let restored = self.inner.store.restore_snapshot_str(&text);
                if restored {
                    tracing::debug!("snapshot restored");
                }
                restored
            }
            Ok(None) => false,
            Err(e) => {
                self.inner.report(&e);
                false
            }
        }
    }

    /// Start saving after every commit, debounced.
    ///
    /// Must be called from within a tokio runtime; the handle is kept for
    /// commits made on threads outside it.
    pub fn attach(&self) -> Result<(), PersistError> {
        let runtime = Handle::try_current().map_err(|e| PersistError::Runtime(e.to_string()))?;
        *lock(&self.inner.runtime) = Some(runtime);

        let weak: Weak<AdapterInner> = Arc::downgrade(&self.inner);
        let subscription = self.inner.store.on_commit(move |_record| {
            if let Some(inner) = weak.upgrade() {
                inner.schedule();
            }
        });
        if let Some(previous) = lock(&self.inner.subscription).replace(subscription) {
            previous.unsubscribe();
        }
        Ok(())
    }

    /// Stop reacting to commits and drop any pending save.
    pub fn detach(&self) {
        if let Some(subscription) = lock(&self.inner.subscription).take() {
            subscription.unsubscribe();
        }
        self.cancel();
    }

    /// Whether a debounced save is waiting to start.
    pub fn has_pending(&self) -> bool {
        lock(&self.inner.pending)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Drop the pending save, if any. A save already running is not stopped.
    pub fn cancel(&self) {
        if let Some(task) = lock(&self.inner.pending).take() {
            task.abort();
        }
    }

    /// Save immediately, replacing any pending debounced save.
    ///
    /// If another save is running the call only marks the adapter dirty, so
    /// that save is followed by one more.
    pub async fn save_now(&self) -> Result<(), PersistError> {
        self.cancel();
        Arc::clone(&self.inner).run_save().await
    }

    /// Run the pending save now. Does nothing when no save is pending.
    pub async fn flush(&self) -> Result<(), PersistError> {
        let pending = lock(&self.inner.pending).take();
        match pending {
            Some(task) if !task.is_finished() => {
                task.abort();
                Arc::clone(&self.inner).run_save().await
            }
            _ => Ok(()),
        }
    }

    /// Remove the stored snapshot.
    pub async fn clear(&self) -> Result<(), PersistError> {
        self.cancel();
        self.inner.snapshots.clear().await
    }
}

impl AdapterInner {
    fn schedule(self: &Arc<Self>) {
        if self.in_flight.load(Ordering::SeqCst) {
            self.dirty.store(true, Ordering::SeqCst);
            return;
        }
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => match lock(&self.runtime).clone() {
                Some(handle) => handle,
                None => {
                    tracing::warn!("commit not persisted: adapter has no runtime");
                    return;
                }
            },
        };

        // The timer only sleeps and then spawns the save, so aborting a
        // superseded timer can never interrupt a save halfway.
        let weak = Arc::downgrade(self);
        let delay = self.options.debounce;
        let spawner = runtime.clone();
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                spawner.spawn(async move {
                    let _ = inner.run_save().await;
                });
            }
        });
        if let Some(previous) = lock(&self.pending).replace(timer) {
            previous.abort();
        }
    }

    async fn run_save(self: Arc<Self>) -> Result<(), PersistError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.dirty.store(true, Ordering::SeqCst);
            return Ok(());
        }
        self.dirty.store(false, Ordering::SeqCst);

        let result = self.write_snapshot().await;
        self.in_flight.store(false, Ordering::SeqCst);
        if let Err(e) = &result {
            self.report(e);
        }
        if self.dirty.swap(false, Ordering::SeqCst) {
            self.schedule();
        }
        result
    }

    async fn write_snapshot(&self) -> Result<(), PersistError> {
        let snapshot = self
            .store
            .persisted_snapshot(self.options.strategy, self.options.max_commits);
        let text = snapshot
            .to_json_string()
            .map_err(|e| PersistError::Serialization(e.to_string()))?;
        self.snapshots.save(&text).await?;
        tracing::debug!(
            strategy = ?self.options.strategy,
            bytes = text.len(),
            "snapshot saved"
        );
        Ok(())
    }

    fn report(&self, error: &PersistError) {
        tracing::warn!(error = %error, "snapshot persistence failed");
        let callback = lock(&self.on_error).clone();
        if let Some(callback) = callback {
            callback(error);
        }
    }
}

impl Drop for AdapterInner {
    fn drop(&mut self) {
        if let Some(subscription) = lock(&self.subscription).take() {
            subscription.unsubscribe();
        }
        if let Some(task) = lock(&self.pending).take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceAdapter")
            .field("options", &self.inner.options)
            .field("in_flight", &self.inner.in_flight.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
