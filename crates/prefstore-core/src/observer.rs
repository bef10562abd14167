//! Change observers with explicit subscription handles
//!
//! Observers register for an exact key (a full key path for dictionary
//! documents, an index for array documents); prefixes never match.
//! `subscribe` returns a [`Subscription`] handle the caller retains —
//! dropping it revokes the registration, which replaces the weak-observer
//! pattern with an unambiguous lifetime.
//!
//! Notifications fire after persistence has been *requested* (not after
//! the physical write lands) and run synchronously on the mutating thread.

use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::value::Value;

/// Callback invoked with the key and the new value (`None` on removal).
pub type ObserverCallback<K> = Arc<dyn Fn(&K, Option<&Value>) + Send + Sync>;

struct Registered<K> {
    id: u64,
    callback: ObserverCallback<K>,
}

struct RegistryInner<K> {
    next_id: u64,
    observers: hashbrown::HashMap<K, Vec<Registered<K>>>,
}

/// Per-document observer table.
pub struct ObserverRegistry<K> {
    inner: Arc<Mutex<RegistryInner<K>>>,
}

impl<K: Eq + Hash + Clone> ObserverRegistry<K> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                next_id: 0,
                observers: hashbrown::HashMap::new(),
            })),
        }
    }

    /// Register `callback` for changes to exactly `key`.
    pub fn subscribe(
        &self,
        key: K,
        callback: impl Fn(&K, Option<&Value>) + Send + Sync + 'static,
    ) -> Subscription<K> {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .observers
            .entry(key.clone())
            .or_default()
            .push(Registered { id, callback: Arc::new(callback) });

        Subscription {
            key,
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every observer registered for exactly `key`.
    ///
    /// Callbacks are cloned out of the table first so observers may
    /// subscribe or unsubscribe from within their own callback.
    pub fn notify(&self, key: &K, value: Option<&Value>) {
        let callbacks: Vec<ObserverCallback<K>> = {
            let inner = self.inner.lock();
            match inner.observers.get(key) {
                Some(list) => list.iter().map(|r| Arc::clone(&r.callback)).collect(),
                None => return,
            }
        };
        for callback in callbacks {
            callback(key, value);
        }
    }

    /// Number of live registrations for `key`.
    pub fn observer_count(&self, key: &K) -> usize {
        self.inner.lock().observers.get(key).map_or(0, Vec::len)
    }
}

impl<K: Eq + Hash + Clone> Default for ObserverRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle tying a registration to its owner. Dropping it unsubscribes.
pub struct Subscription<K: Eq + Hash> {
    key: K,
    id: u64,
    registry: Weak<Mutex<RegistryInner<K>>>,
}

impl<K: Eq + Hash> Subscription<K> {
    /// Explicitly revoke the registration; equivalent to dropping.
    pub fn cancel(self) {}
}

impl<K: Eq + Hash> Drop for Subscription<K> {
    fn drop(&mut self) {
        // The registry may already be gone when the document outlived us
        // the other way around; nothing to revoke then.
        if let Some(inner) = self.registry.upgrade() {
            let mut inner = inner.lock();
            if let Some(list) = inner.observers.get_mut(&self.key) {
                list.retain(|r| r.id != self.id);
                if list.is_empty() {
                    inner.observers.remove(&self.key);
                }
            }
        }
    }
}
