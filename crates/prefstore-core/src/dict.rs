//! Dictionary document — a key-path addressed view over a map container
//!
//! Public operations (`get`, `set`, `remove`, `observe`) may be called from
//! any thread. Reads check the LRU cache first and fall back to walking the
//! current tree; writes run a read-modify-write cycle under the document's
//! write lock, publish the new tree through the container (which coalesces
//! the disk write), then update the cache and notify observers for the
//! exact key path.
//!
//! Per the error policy, only `NotReady` is returned to mutating callers —
//! it signals caller misuse. Every other failure is reported through the
//! error sink while the call itself stays non-blocking.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{CacheStrategy, DocumentCache};
use crate::config::Config;
use crate::container::Container;
use crate::error::{LogSink, SharedSink, StoreError, StoreResult};
use crate::keypath::{lookup, split_key_path, store};
use crate::observer::{ObserverRegistry, Subscription};
use crate::value::{FromValue, Map, Value};

/// Typed, observable, path-addressed document over a map tree.
pub struct DictDocument {
    container: Container,
    cache: Arc<dyn DocumentCache<String>>,
    observers: ObserverRegistry<String>,
    /// Serializes read-modify-write cycles so concurrent sets cannot lose
    /// each other's updates
    write_lock: Mutex<()>,
}

impl DictDocument {
    /// Open with the built-in LRU cache and the logging error sink.
    pub fn new(config: Config) -> StoreResult<Self> {
        Self::with_options(config, CacheStrategy::Lru, Arc::new(LogSink))
    }

    /// Open with explicit cache strategy and error sink.
    pub fn with_options(
        config: Config,
        strategy: CacheStrategy<String>,
        sink: SharedSink,
    ) -> StoreResult<Self> {
        let cache = strategy.build(config.cache_capacity, config.cache_mode());
        let container = Container::new(Value::Map(Map::new()), config, sink)?;
        Ok(Self {
            container,
            cache,
            observers: ObserverRegistry::new(),
            write_lock: Mutex::new(()),
        })
    }

    /// Raw value at a key path: cache first, then a tree walk.
    pub fn value(&self, key_path: &str) -> Option<Value> {
        let cache_key = key_path.to_string();
        if let Some(hit) = self.cache.get(&cache_key) {
            return Some(hit);
        }

        let segments = match split_key_path(key_path) {
            Ok(segments) => segments,
            Err(e) => {
                self.report(&e);
                return None;
            }
        };

        let tree = self.container.current_tree()?;
        let Some(map) = tree.as_map() else {
            self.report(&StoreError::Decode {
                message: format!("document root is {}, expected map", tree.type_name()),
                offset: None,
            });
            return None;
        };

        match lookup(map, key_path, &segments) {
            Ok(Some(value)) => {
                let value = value.clone();
                self.cache.set(&cache_key, Some(value.clone()));
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    /// Typed read via direct leaf match; `None` on miss or kind mismatch.
    pub fn get<T: FromValue>(&self, key_path: &str) -> Option<T> {
        self.value(key_path).and_then(|v| T::from_value(&v))
    }

    /// Typed read with a caller-supplied default for any failure.
    pub fn get_or<T: FromValue>(&self, key_path: &str, default: T) -> T {
        self.get(key_path).unwrap_or(default)
    }

    /// Structured read: bridge the sub-tree into a `Deserialize` type.
    pub fn get_decoded<T: DeserializeOwned>(&self, key_path: &str) -> Option<T> {
        let value = self.value(key_path)?;
        match value.decode_as() {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    /// Store a value at a key path, creating intermediate maps.
    pub fn set(&self, key_path: &str, value: impl Into<Value>) -> StoreResult<()> {
        self.store_value(key_path, Some(value.into()))
    }

    /// Store an arbitrary `Serialize` value by bridging it into a tree.
    pub fn set_encoded<T: Serialize>(&self, key_path: &str, value: &T) -> StoreResult<()> {
        match Value::encode_from(value) {
            Ok(bridged) => self.store_value(key_path, Some(bridged)),
            Err(e) => {
                self.report(&e);
                Ok(())
            }
        }
    }

    /// Remove the value at a key path; nested paths resolve fully.
    pub fn remove(&self, key_path: &str) -> StoreResult<()> {
        self.store_value(key_path, None)
    }

    fn store_value(&self, key_path: &str, value: Option<Value>) -> StoreResult<()> {
        let _guard = self.write_lock.lock();

        let segments = match split_key_path(key_path) {
            Ok(segments) => segments,
            Err(e) => {
                self.report(&e);
                return Ok(());
            }
        };

        let Some(mut tree) = self.container.tree_for_update() else {
            // Load failure already reported by the container.
            return Ok(());
        };
        let Some(map) = tree.as_map_mut() else {
            self.report(&StoreError::Decode {
                message: format!("document root is {}, expected map", tree.type_name()),
                offset: None,
            });
            return Ok(());
        };

        if let Err(e) = store(map, key_path, &segments, value.clone()) {
            self.report(&e);
            return Ok(());
        }

        // NotReady is the one failure the caller gets back directly.
        self.container.set_container(tree)?;

        let cache_key = key_path.to_string();
        self.cache.set(&cache_key, value.clone());
        self.observers.notify(&cache_key, value.as_ref());
        Ok(())
    }

    /// Register an observer for exactly `key_path`. Hold the handle; it
    /// unsubscribes on drop.
    pub fn observe(
        &self,
        key_path: &str,
        callback: impl Fn(&String, Option<&Value>) + Send + Sync + 'static,
    ) -> Subscription<String> {
        self.observers.subscribe(key_path.to_string(), callback)
    }

    /// Drain pending coalesced writes to disk.
    pub fn flush(&self) {
        self.container.flush();
    }

    /// Whether the backing file loaded (or was created) successfully.
    pub fn is_ready(&self) -> bool {
        self.container.is_ready()
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    fn report(&self, error: &StoreError) {
        self.container.sink().store_error(error);
    }
}
