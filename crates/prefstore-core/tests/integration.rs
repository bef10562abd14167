//! Integration tests: full document pipeline over a real file.
//!
//! These tests exercise the public surface end to end: open a document
//! against a temp file, mutate it, flush, reopen, and check what the
//! next process generation would see.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use prefstore_core::{
    ArrayDocument, CacheStrategy, Config, DictDocument, ErrorSink, LogSink, StoreError, Value,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast_config(path: impl Into<std::path::PathBuf>) -> Config {
    let mut config = Config::binary(path);
    config.coalesce_window = Duration::from_millis(1);
    config
}

struct CountingSink(AtomicUsize);

impl ErrorSink for CountingSink {
    fn store_error(&self, _error: &StoreError) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Dict documents across process generations
// ---------------------------------------------------------------------------

#[test]
fn test_dict_roundtrip_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.bin");

    {
        let doc = DictDocument::new(fast_config(&path)).unwrap();
        doc.set("volume", 7i64).unwrap();
        doc.set("player.name", "ada").unwrap();
        doc.set("player.score", 120.5f64).unwrap();
        doc.flush();
    }

    let doc = DictDocument::new(fast_config(&path)).unwrap();
    assert_eq!(doc.get::<i64>("volume"), Some(7));
    assert_eq!(doc.get::<String>("player.name").as_deref(), Some("ada"));
    assert_eq!(doc.get::<f64>("player.score"), Some(120.5));
    assert_eq!(doc.get::<Value>("missing"), None);
}

#[test]
fn test_json_document_is_human_readable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");

    let mut config = Config::json(&path);
    config.coalesce_window = Duration::from_millis(1);
    let doc = DictDocument::new(config).unwrap();
    doc.set("theme", "dark").unwrap();
    doc.flush();

    let raw = std::fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["theme"], "dark");
}

#[test]
fn test_create_if_missing_controls_first_write() {
    let dir = TempDir::new().unwrap();

    // Eager: the file exists before any set.
    let eager = dir.path().join("eager.bin");
    let doc = DictDocument::new(fast_config(&eager)).unwrap();
    doc.flush();
    assert!(eager.exists());
    drop(doc);

    // Deferred: nothing on disk until the first mutation lands.
    let lazy = dir.path().join("lazy.bin");
    let mut config = fast_config(&lazy);
    config.create_if_missing = false;
    let doc = DictDocument::new(config).unwrap();
    assert!(doc.is_ready());
    assert!(!lazy.exists());
    doc.set("k", 1i64).unwrap();
    doc.flush();
    assert!(lazy.exists());
}

#[test]
fn test_removal_persists() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.bin");

    {
        let doc = DictDocument::new(fast_config(&path)).unwrap();
        doc.set("keep", 1i64).unwrap();
        doc.set("drop", 2i64).unwrap();
        doc.remove("drop").unwrap();
        doc.flush();
    }

    let doc = DictDocument::new(fast_config(&path)).unwrap();
    assert_eq!(doc.get::<i64>("keep"), Some(1));
    assert_eq!(doc.get::<Value>("drop"), None);
}

// ---------------------------------------------------------------------------
// Write coalescing observed from outside
// ---------------------------------------------------------------------------

#[test]
fn test_burst_of_sets_lands_as_final_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("counter.bin");

    {
        let mut config = Config::binary(&path);
        config.coalesce_window = Duration::from_millis(50);
        let doc = DictDocument::new(config).unwrap();
        for i in 0..100i64 {
            doc.set("n", i).unwrap();
        }
        // Drop without an explicit flush; close must drain the last state.
    }

    let doc = DictDocument::new(fast_config(&path)).unwrap();
    assert_eq!(doc.get::<i64>("n"), Some(99));
}

// ---------------------------------------------------------------------------
// Structured values through serde
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Session {
    user: String,
    token: String,
    attempts: u32,
}

#[test]
fn test_struct_bridge_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.bin");

    let session = Session {
        user: "ada".into(),
        token: "t-123".into(),
        attempts: 3,
    };

    {
        let doc = DictDocument::new(fast_config(&path)).unwrap();
        doc.set_encoded("auth.session", &session).unwrap();
        doc.flush();
    }

    let doc = DictDocument::new(fast_config(&path)).unwrap();
    assert_eq!(doc.get_decoded::<Session>("auth.session"), Some(session));
    // Individual fields stay addressable through the key path.
    assert_eq!(doc.get::<i64>("auth.session.attempts"), Some(3));
}

// ---------------------------------------------------------------------------
// Arrays
// ---------------------------------------------------------------------------

#[test]
fn test_array_roundtrip_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("recent.bin");

    {
        let doc = ArrayDocument::new(fast_config(&path)).unwrap();
        doc.append("a").unwrap();
        doc.append("b").unwrap();
        doc.append("c").unwrap();
        doc.remove(1).unwrap();
        doc.flush();
    }

    let doc = ArrayDocument::new(fast_config(&path)).unwrap();
    assert_eq!(doc.len(), 2);
    assert_eq!(doc.get::<String>(0).as_deref(), Some("a"));
    assert_eq!(doc.get::<String>(1).as_deref(), Some("c"));
}

// ---------------------------------------------------------------------------
// Observation and failure reporting
// ---------------------------------------------------------------------------

#[test]
fn test_observer_survives_unrelated_writes() {
    let dir = TempDir::new().unwrap();
    let doc = DictDocument::new(fast_config(dir.path().join("obs.bin"))).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let sub = doc.observe("watched", move |_key, _value| {
        hits_clone.fetch_add(1, Ordering::SeqCst);
    });

    doc.set("watched", 1i64).unwrap();
    doc.set("other", 2i64).unwrap();
    doc.set("watched", 3i64).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    drop(sub);
    doc.set("watched", 4i64).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2, "cancelled after drop");
}

#[test]
fn test_corrupt_file_reports_but_allows_repair() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.bin");
    std::fs::write(&path, b"not a document").unwrap();

    let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
    let doc =
        DictDocument::with_options(fast_config(&path), CacheStrategy::Lru, sink.clone()).unwrap();

    assert!(!doc.is_ready());
    assert!(matches!(doc.set("k", 1i64), Err(StoreError::NotReady)));
    assert!(sink.0.load(Ordering::SeqCst) >= 1);
}

#[test]
fn test_async_cache_mode_converges_on_latest_value() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(dir.path().join("async.bin"));
    config.cache_async = true;

    let doc =
        DictDocument::with_options(config, CacheStrategy::Lru, Arc::new(LogSink)).unwrap();
    for i in 0..50i64 {
        doc.set("n", i).unwrap();
    }

    // Cache mutations are applied by a worker thread, so a read may lag a
    // set briefly; it must settle on the final value.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let seen = doc.get::<i64>("n");
        if seen == Some(49) {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "async cache never converged, last read {seen:?}"
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}
