//! PrefStore Core — File-Backed Observable Preference Store
//!
//! A small local key-value store where a single file is the unit of
//! persistence and RAM is the working surface: reads come from an
//! in-memory tree fronted by an LRU cache, and writes are coalesced so a
//! burst of mutations costs one physical file write.
//!
//! # Architecture
//!
//! - **Read path**: Per-key LRU cache, then the in-memory tree (no disk I/O)
//! - **Write path**: Mutate the tree, hand the encoded document to a
//!   coalescing writer that collapses bursts into one `fs::write`
//! - **Documents**: String-keyed [`DictDocument`] with dotted key paths,
//!   or index-addressed [`ArrayDocument`]
//! - **Observation**: Per-key subscriptions with handle-based cancellation
//!
//! # No Service Dependencies
//!
//! This crate talks only to the local filesystem. There is no network,
//! no database, no platform-specific persistence API.

pub mod array;
pub mod cache;
pub mod codec;
pub mod config;
pub mod container;
pub mod dict;
pub mod error;
pub mod keypath;
pub mod observer;
pub mod reader;
pub mod value;
pub mod writer;

// Re-export key types for convenience
pub use array::ArrayDocument;
pub use cache::{CacheMode, CacheStrategy, DocumentCache, LruCache, NoCache};
pub use codec::{BinaryCodec, DocumentDecoder, DocumentEncoder, JsonCodec};
pub use config::Config;
pub use container::Container;
pub use dict::DictDocument;
pub use error::{ErrorSink, LogSink, SharedSink, StoreError, StoreResult};
pub use observer::Subscription;
pub use value::{FromValue, Map, Value};
