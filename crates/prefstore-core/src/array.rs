//! Array document — an index-addressed view over a list container
//!
//! The array variant of [`DictDocument`](crate::dict::DictDocument):
//! elements are addressed by integer index, `append` is a set at `len`,
//! and observers register per index. An out-of-range `set` or `remove` is
//! rejected and reported through the sink — indices are never padded up
//! with filler values.
//!
//! Removing an element shifts every later index down by one, so a removal
//! invalidates the whole index cache instead of chasing renumbered keys.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{CacheStrategy, DocumentCache};
use crate::config::Config;
use crate::container::Container;
use crate::error::{LogSink, SharedSink, StoreError, StoreResult};
use crate::observer::{ObserverRegistry, Subscription};
use crate::value::{FromValue, Value};

/// Typed, observable, index-addressed document over a list tree.
pub struct ArrayDocument {
    container: Container,
    cache: Arc<dyn DocumentCache<usize>>,
    observers: ObserverRegistry<usize>,
    write_lock: Mutex<()>,
}

impl ArrayDocument {
    /// Open with the built-in LRU cache and the logging error sink.
    pub fn new(config: Config) -> StoreResult<Self> {
        Self::with_options(config, CacheStrategy::Lru, Arc::new(LogSink))
    }

    /// Open with explicit cache strategy and error sink.
    pub fn with_options(
        config: Config,
        strategy: CacheStrategy<usize>,
        sink: SharedSink,
    ) -> StoreResult<Self> {
        let cache = strategy.build(config.cache_capacity, config.cache_mode());
        let container = Container::new(Value::List(Vec::new()), config, sink)?;
        Ok(Self {
            container,
            cache,
            observers: ObserverRegistry::new(),
            write_lock: Mutex::new(()),
        })
    }

    /// Current element count.
    pub fn len(&self) -> usize {
        self.with_list(|list| list.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw value at an index: cache first, then the current tree.
    pub fn value(&self, index: usize) -> Option<Value> {
        if let Some(hit) = self.cache.get(&index) {
            return Some(hit);
        }

        let value = self.with_list(|list| list.get(index).cloned())??;
        self.cache.set(&index, Some(value.clone()));
        Some(value)
    }

    /// Typed read via direct leaf match.
    pub fn get<T: FromValue>(&self, index: usize) -> Option<T> {
        self.value(index).and_then(|v| T::from_value(&v))
    }

    /// Typed read with a caller-supplied default for any failure.
    pub fn get_or<T: FromValue>(&self, index: usize, default: T) -> T {
        self.get(index).unwrap_or(default)
    }

    /// Structured read: bridge the element into a `Deserialize` type.
    pub fn get_decoded<T: DeserializeOwned>(&self, index: usize) -> Option<T> {
        let value = self.value(index)?;
        match value.decode_as() {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    /// Replace the element at `index`. Out-of-range is rejected and
    /// reported; only `NotReady` comes back as an error.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> StoreResult<()> {
        self.mutate(index, Mutation::Replace(value.into()))
    }

    /// Bridge an arbitrary `Serialize` value and replace the element.
    pub fn set_encoded<T: Serialize>(&self, index: usize, value: &T) -> StoreResult<()> {
        match Value::encode_from(value) {
            Ok(bridged) => self.mutate(index, Mutation::Replace(bridged)),
            Err(e) => {
                self.report(&e);
                Ok(())
            }
        }
    }

    /// Append at the end; equivalent to a set at `len`.
    pub fn append(&self, value: impl Into<Value>) -> StoreResult<()> {
        self.mutate(usize::MAX, Mutation::Append(value.into()))
    }

    /// Remove the element at `index`, shifting later elements down.
    pub fn remove(&self, index: usize) -> StoreResult<()> {
        self.mutate(index, Mutation::Remove)
    }

    /// Register an observer for exactly `index`.
    pub fn observe(
        &self,
        index: usize,
        callback: impl Fn(&usize, Option<&Value>) + Send + Sync + 'static,
    ) -> Subscription<usize> {
        self.observers.subscribe(index, callback)
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

    fn mutate(&self, index: usize, mutation: Mutation) -> StoreResult<()> {
        let _guard = self.write_lock.lock();

        let Some(mut tree) = self.container.tree_for_update() else {
            return Ok(());
        };
        let Some(list) = tree.as_list_mut() else {
            self.report(&StoreError::Decode {
                message: format!("document root is {}, expected list", tree.type_name()),
                offset: None,
            });
            return Ok(());
        };

        let (index, value) = match mutation {
            Mutation::Replace(value) => {
                if index >= list.len() {
                    self.report(&StoreError::IndexOutOfRange { index, len: list.len() });
                    return Ok(());
                }
                list[index] = value.clone();
                (index, Some(value))
            }
            Mutation::Append(value) => {
                list.push(value.clone());
                (list.len() - 1, Some(value))
            }
            Mutation::Remove => {
                if index >= list.len() {
                    self.report(&StoreError::IndexOutOfRange { index, len: list.len() });
                    return Ok(());
                }
                list.remove(index);
                (index, None)
            }
        };

        self.container.set_container(tree)?;

        match &value {
            Some(new_value) => self.cache.set(&index, Some(new_value.clone())),
            // Later elements were renumbered; drop the whole index cache.
            None => self.cache.clear(),
        }
        self.observers.notify(&index, value.as_ref());
        Ok(())
    }

    fn with_list<R>(&self, f: impl FnOnce(&[Value]) -> R) -> Option<R> {
        let tree = self.container.current_tree()?;
        match tree.as_list() {
            Some(list) => Some(f(list)),
            None => {
                self.report(&StoreError::Decode {
                    message: format!("document root is {}, expected list", tree.type_name()),
                    offset: None,
                });
                None
            }
        }
    }

    fn report(&self, error: &StoreError) {
        self.container.sink().store_error(error);
    }
}

enum Mutation {
    Replace(Value),
    Append(Value),
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::test_support::CollectSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> (ArrayDocument, Arc<CollectSink>) {
        let mut config = Config::binary(dir.path().join("items.bin"));
        config.coalesce_window = Duration::from_millis(1);
        let sink = CollectSink::new();
        let doc = ArrayDocument::with_options(config, CacheStrategy::Lru, sink.clone()).unwrap();
        (doc, sink)
    }

    #[test]
    fn test_append_and_get() {
        let dir = TempDir::new().unwrap();
        let (doc, sink) = open(&dir);

        doc.append("first").unwrap();
        doc.append(2i64).unwrap();

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get::<String>(0).as_deref(), Some("first"));
        assert_eq!(doc.get::<i64>(1), Some(2));
        assert_eq!(doc.get::<Value>(2), None);
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_set_replaces_in_range() {
        let dir = TempDir::new().unwrap();
        let (doc, _sink) = open(&dir);

        doc.append(1i64).unwrap();
        doc.set(0, 99i64).unwrap();
        assert_eq!(doc.get::<i64>(0), Some(99));
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_out_of_range_set_rejected() {
        let dir = TempDir::new().unwrap();
        let (doc, sink) = open(&dir);

        doc.append(1i64).unwrap();
        doc.set(5, 2i64).unwrap();

        assert_eq!(sink.categories(), vec!["index-out-of-range"]);
        assert_eq!(doc.len(), 1, "no padding up to the requested index");
    }

    #[test]
    fn test_remove_shifts_and_invalidates_cache() {
        let dir = TempDir::new().unwrap();
        let (doc, sink) = open(&dir);

        for i in 0..3 {
            doc.append(i as i64).unwrap();
        }
        // Warm the cache for every index.
        for i in 0..3 {
            assert_eq!(doc.get::<i64>(i), Some(i as i64));
        }

        doc.remove(0).unwrap();

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get::<i64>(0), Some(1), "stale cache would say 0");
        assert_eq!(doc.get::<i64>(1), Some(2));
        assert_eq!(doc.get::<Value>(2), None);
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_remove_out_of_range_rejected() {
        let dir = TempDir::new().unwrap();
        let (doc, sink) = open(&dir);
        doc.remove(0).unwrap();
        assert_eq!(sink.categories(), vec!["index-out-of-range"]);
    }

    #[test]
    fn test_observer_fires_for_exact_index() {
        let dir = TempDir::new().unwrap();
        let (doc, _sink) = open(&dir);

        doc.append(0i64).unwrap();
        doc.append(0i64).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let _sub = doc.observe(1, move |_index, _value| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        doc.set(0, 5i64).unwrap();
        doc.set(1, 6i64).unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.bin");

        {
            let mut config = Config::binary(&path);
            config.coalesce_window = Duration::from_millis(1);
            let doc =
                ArrayDocument::with_options(config, CacheStrategy::Lru, CollectSink::new())
                    .unwrap();
            doc.append("kept").unwrap();
            doc.append(7i64).unwrap();
            doc.flush();
        }

        let mut config = Config::binary(&path);
        config.coalesce_window = Duration::from_millis(1);
        let doc =
            ArrayDocument::with_options(config, CacheStrategy::Lru, CollectSink::new()).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get::<String>(0).as_deref(), Some("kept"));
        assert_eq!(doc.get::<i64>(1), Some(7));
    }
}
