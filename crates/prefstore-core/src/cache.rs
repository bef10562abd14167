//! Fixed-capacity LRU cache for resolved key-path values
//!
//! The cache avoids re-walking (or re-decoding) the whole document on every
//! read. It is a classic doubly-linked recency list plus a hash index: the
//! list owns the entries through slot indices into a `Vec`, the index maps
//! key → slot. Head is most recently used, tail is least; eviction always
//! unlinks from the tail.
//!
//! [`SharedCache`] wraps the structure for concurrent use in one of two
//! modes fixed at construction: synchronous (mutations applied on the
//! calling thread under the lock) or asynchronous (mutations forwarded to
//! one serial worker thread, so a `set` from another thread becomes visible
//! eventually rather than immediately).

use std::hash::Hash;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::value::Value;

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly-linked LRU list with a hash index. Not thread safe on its own;
/// see [`SharedCache`] for the concurrent wrapper.
pub struct LruCache<K, V> {
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    index: hashbrown::HashMap<K, usize>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            index: hashbrown::HashMap::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// O(1) lookup. A hit promotes the entry to most-recently-used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.unlink(idx);
        self.push_front(idx);
        self.nodes[idx].as_ref().map(|n| &n.value)
    }

    /// Lookup without promotion.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.nodes[idx].as_ref().map(|n| &n.value)
    }

    /// Insert or update. An existing key has its value replaced in place
    /// and is promoted; a new key is inserted at the head. Evicts from the
    /// tail until the cache is back within capacity.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(&idx) = self.index.get(&key) {
            if let Some(node) = self.nodes[idx].as_mut() {
                node.value = value;
            }
            self.unlink(idx);
            self.push_front(idx);
            return;
        }

        let node = Node { key: key.clone(), value, prev: None, next: None };
        let idx = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(key, idx);
        self.len += 1;
        self.push_front(idx);

        while self.len > self.capacity {
            self.evict_tail();
        }
    }

    /// Drop every entry, keeping the capacity.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Unlink and erase; no-op when the key is absent.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.index.remove(key)?;
        self.unlink(idx);
        let node = self.nodes[idx].take()?;
        self.free.push(idx);
        self.len -= 1;
        Some(node.value)
    }

    fn evict_tail(&mut self) {
        let Some(idx) = self.tail else { return };
        self.unlink(idx);
        if let Some(node) = self.nodes[idx].take() {
            self.index.remove(&node.key);
            self.len -= 1;
        }
        self.free.push(idx);
    }

    /// Detach `idx` from the list, patching neighbor pointers and the
    /// head/tail endpoints.
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.nodes[idx].as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.nodes[p].as_mut() {
                    node.next = next;
                }
            }
            None => {
                if self.head == Some(idx) {
                    self.head = next;
                }
            }
        }

        match next {
            Some(n) => {
                if let Some(node) = self.nodes[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => {
                if self.tail == Some(idx) {
                    self.tail = prev;
                }
            }
        }

        if let Some(node) = self.nodes[idx].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    fn push_front(&mut self, idx: usize) {
        if let Some(node) = self.nodes[idx].as_mut() {
            node.prev = None;
            node.next = self.head;
        }
        if let Some(old_head) = self.head {
            if let Some(node) = self.nodes[old_head].as_mut() {
                node.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    /// Keys from most to least recently used, by walking the list.
    #[cfg(test)]
    fn keys_mru_first(&self) -> Vec<K> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = self.nodes[idx].as_ref().expect("index points at live node");
            out.push(node.key.clone());
            cursor = node.next;
        }
        out
    }
}

/// Which thread applies cache mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Mutations applied on the calling thread, immediately visible
    Synchronous,
    /// Mutations forwarded to one serial worker, eventually visible
    Asynchronous,
}

enum CacheOp<K> {
    Set(K, Value),
    Remove(K),
    Clear,
}

/// Strategy seam a document reads and writes its cache through.
///
/// `set(key, None)` removes the entry, mirroring key removal in the
/// document itself.
pub trait DocumentCache<K>: Send + Sync {
    fn get(&self, key: &K) -> Option<Value>;
    fn set(&self, key: &K, value: Option<Value>);
    /// Invalidate everything; used when keys shift wholesale (array
    /// element removal renumbers every later index).
    fn clear(&self);
}

/// Caching disabled: every read walks the document.
pub struct NoCache;

impl<K> DocumentCache<K> for NoCache {
    fn get(&self, _key: &K) -> Option<Value> {
        None
    }

    fn set(&self, _key: &K, _value: Option<Value>) {}

    fn clear(&self) {}
}

/// Concurrency wrapper around [`LruCache`], mode fixed at construction.
pub struct SharedCache<K: Eq + Hash + Clone + Send + 'static> {
    inner: Arc<Mutex<LruCache<K, Value>>>,
    tx: Mutex<Option<mpsc::Sender<CacheOp<K>>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<K: Eq + Hash + Clone + Send + 'static> SharedCache<K> {
    pub fn new(capacity: usize, mode: CacheMode) -> Self {
        let inner = Arc::new(Mutex::new(LruCache::new(capacity)));

        let (tx, worker) = match mode {
            CacheMode::Synchronous => (None, None),
            CacheMode::Asynchronous => {
                let (tx, rx) = mpsc::channel::<CacheOp<K>>();
                let cache = Arc::clone(&inner);
                let handle = thread::Builder::new()
                    .name("prefstore-cache".to_string())
                    .spawn(move || {
                        while let Ok(op) = rx.recv() {
                            let mut cache = cache.lock();
                            match op {
                                CacheOp::Set(key, value) => cache.insert(key, value),
                                CacheOp::Remove(key) => {
                                    cache.remove(&key);
                                }
                                CacheOp::Clear => cache.clear(),
                            }
                        }
                    })
                    .ok();
                match handle {
                    Some(handle) => (Some(tx), Some(handle)),
                    // Spawn failed: fall back to synchronous application.
                    None => (None, None),
                }
            }
        };

        Self {
            inner,
            tx: Mutex::new(tx),
            worker: Mutex::new(worker),
        }
    }

    fn apply(&self, op: CacheOp<K>) {
        // A failed send returns the op so it can be applied synchronously.
        let op = {
            let tx = self.tx.lock();
            match tx.as_ref() {
                Some(tx) => match tx.send(op) {
                    Ok(()) => return,
                    Err(mpsc::SendError(op)) => op,
                },
                None => op,
            }
        };
        let mut cache = self.inner.lock();
        match op {
            CacheOp::Set(key, value) => cache.insert(key, value),
            CacheOp::Remove(key) => {
                cache.remove(&key);
            }
            CacheOp::Clear => cache.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl<K: Eq + Hash + Clone + Send + 'static> DocumentCache<K> for SharedCache<K> {
    fn get(&self, key: &K) -> Option<Value> {
        self.inner.lock().get(key).cloned()
    }

    fn set(&self, key: &K, value: Option<Value>) {
        match value {
            Some(value) => self.apply(CacheOp::Set(key.clone(), value)),
            None => self.apply(CacheOp::Remove(key.clone())),
        }
    }

    fn clear(&self) {
        self.apply(CacheOp::Clear);
    }
}

impl<K: Eq + Hash + Clone + Send + 'static> Drop for SharedCache<K> {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain queued ops and exit.
        self.tx.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Cache selection for a document.
pub enum CacheStrategy<K> {
    /// No caching at all
    None,
    /// Built-in LRU with the configured capacity and mode
    Lru,
    /// Caller-supplied implementation
    Custom(Arc<dyn DocumentCache<K>>),
}

impl<K: Eq + Hash + Clone + Send + 'static> CacheStrategy<K> {
    pub(crate) fn build(self, capacity: usize, mode: CacheMode) -> Arc<dyn DocumentCache<K>> {
        match self {
            CacheStrategy::None => Arc::new(NoCache),
            CacheStrategy::Lru => Arc::new(SharedCache::new(capacity, mode)),
            CacheStrategy::Custom(cache) => cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_insert_within_capacity() {
        let mut cache = LruCache::new(3);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek(&"a"), Some(&1));
        assert_eq!(cache.keys_mru_first(), vec!["b", "a"]);
    }

    #[test]
    fn test_eviction_is_lru_not_fifo() {
        let mut cache = LruCache::new(3);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);

        // Touch the oldest so it survives the next insert.
        assert_eq!(cache.get(&"a"), Some(&1));
        cache.insert("d", 4);

        assert!(cache.contains(&"a"), "promoted entry must survive");
        assert!(!cache.contains(&"b"), "least recently used must go");
        assert_eq!(cache.keys_mru_first(), vec!["d", "a", "c"]);
    }

    #[test]
    fn test_overflow_evicts_exact_excess() {
        let mut cache = LruCache::new(4);
        for i in 0..10 {
            cache.insert(i, i * 10);
        }
        assert_eq!(cache.len(), 4);
        // The four most recently inserted keys remain.
        assert_eq!(cache.keys_mru_first(), vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_update_in_place_promotes() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek(&"a"), Some(&10));
        assert_eq!(cache.keys_mru_first(), vec!["a", "b"]);
    }

    #[test]
    fn test_remove_endpoints_and_middle() {
        let mut cache = LruCache::new(5);
        for k in ["a", "b", "c"] {
            cache.insert(k, ());
        }
        // List is c, b, a. Remove middle, then head, then tail.
        assert!(cache.remove(&"b").is_some());
        assert_eq!(cache.keys_mru_first(), vec!["c", "a"]);
        assert!(cache.remove(&"c").is_some());
        assert_eq!(cache.keys_mru_first(), vec!["a"]);
        assert!(cache.remove(&"a").is_some());
        assert!(cache.is_empty());
        assert!(cache.remove(&"a").is_none());

        // Freed slots get reused.
        cache.insert("x", ());
        assert_eq!(cache.keys_mru_first(), vec!["x"]);
    }

    #[test]
    fn test_get_miss_has_no_side_effect() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"zz"), None);
        assert_eq!(cache.keys_mru_first(), vec!["a"]);
    }

    #[test]
    fn test_capacity_one() {
        let mut cache = LruCache::new(1);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&"b"));
        assert!(!cache.contains(&"a"));
    }

    #[test]
    fn test_shared_cache_synchronous_visibility() {
        let cache: SharedCache<String> = SharedCache::new(8, CacheMode::Synchronous);
        cache.set(&"k".to_string(), Some(Value::Int(1)));
        assert_eq!(cache.get(&"k".to_string()), Some(Value::Int(1)));
        cache.set(&"k".to_string(), None);
        assert_eq!(cache.get(&"k".to_string()), None);
    }

    #[test]
    fn test_shared_cache_synchronous_applies_every_op_kind() {
        let cache: SharedCache<String> = SharedCache::new(8, CacheMode::Synchronous);
        cache.set(&"a".to_string(), Some(Value::Int(1)));
        cache.set(&"b".to_string(), Some(Value::Int(2)));
        assert_eq!(cache.len(), 2);

        cache.set(&"a".to_string(), None);
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_shared_cache_async_eventual_visibility() {
        let cache: SharedCache<String> = SharedCache::new(8, CacheMode::Asynchronous);
        cache.set(&"k".to_string(), Some(Value::Int(7)));

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if cache.get(&"k".to_string()) == Some(Value::Int(7)) {
                break;
            }
            assert!(Instant::now() < deadline, "async set never became visible");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_shared_cache_async_drop_drains_queue() {
        let inner_probe;
        {
            let cache: SharedCache<i32> = SharedCache::new(16, CacheMode::Asynchronous);
            for i in 0..10 {
                cache.set(&i, Some(Value::Int(i as i64)));
            }
            inner_probe = Arc::clone(&cache.inner);
        }
        // Worker joined on drop after draining every queued op.
        assert_eq!(inner_probe.lock().len(), 10);
    }
}
