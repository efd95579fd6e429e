//! Named handler tables and listener lists owned by a store instance.

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// A table of named handlers.
///
/// Registering a name twice replaces the earlier handler. Each registration
/// gets a token so that unregistering a stale registration never removes a
/// newer one.
#[derive(Clone)]
pub(crate) struct Registry<H> {
    entries: IndexMap<String, (u64, H)>,
    next_token: u64,
}

impl<H: Clone> Registry<H> {
    pub(crate) fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            next_token: 0,
        }
    }

    /// Insert or replace `name`, returning the registration token.
    pub(crate) fn register(&mut self, name: impl Into<String>, handler: H) -> u64 {
        self.next_token += 1;
        self.entries
            .insert(name.into(), (self.next_token, handler));
        self.next_token
    }

    /// Remove `name` if it is still held by the registration `token`.
    pub(crate) fn unregister(&mut self, name: &str, token: u64) -> bool {
        match self.entries.get(name) {
            Some((current, _)) if *current == token => {
                self.entries.shift_remove(name);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<H> {
        self.entries.get(name).map(|(_, h)| h.clone())
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Copy out the current table, detached from later registrations.
    pub(crate) fn snapshot(&self) -> IndexMap<String, H> {
        self.entries
            .iter()
            .map(|(name, (_, h))| (name.clone(), h.clone()))
            .collect()
    }
}

/// Listener list with stable removal ids.
pub(crate) struct Listeners<T: ?Sized> {
    entries: Vec<(u64, Arc<T>)>,
    next_id: u64,
}

impl<T: ?Sized> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    pub(crate) fn add(&mut self, listener: Arc<T>) -> u64 {
        self.next_id += 1;
        self.entries.push((self.next_id, listener));
        self.next_id
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let len = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone the current listeners so they can run without the lock held.
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }
}

/// Handle returned by every `register_*` and `on_*` method.
///
/// Dropping a subscription keeps the registration alive; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "dropping a Subscription keeps the registration; call unsubscribe() to remove it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Remove the registration. Later registrations under the same name are
    /// left alone.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
