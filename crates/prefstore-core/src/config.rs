//! Configuration for documents and their containers
//!
//! A configuration fixes, per container instance: the backing file path,
//! the serialization strategy pair, whether the decoded snapshot stays in
//! memory, how the first load runs, whether an absent file is created
//! eagerly, and the cache geometry.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheMode;
use crate::codec::{BinaryCodec, JsonCodec, SharedDecoder, SharedEncoder};
use crate::writer::DEFAULT_COALESCE_WINDOW;

/// Per-container configuration.
#[derive(Clone)]
pub struct Config {
    /// Backing file path; assumed exclusively owned by one container
    pub path: PathBuf,
    /// Whole-document encode strategy
    pub encoder: SharedEncoder,
    /// Whole-document decode strategy
    pub decoder: SharedDecoder,
    /// Keep the decoded snapshot in memory (vs. re-decode per read)
    pub cache_origin_data: bool,
    /// Block construction until the first load completes
    pub read_synchronously: bool,
    /// Write the default value immediately when the file is absent
    /// (vs. defer creation to the first explicit write)
    pub create_if_missing: bool,
    /// LRU capacity for the document's key-path cache
    pub cache_capacity: usize,
    /// Apply cache mutations on a serial worker instead of the caller
    pub cache_async: bool,
    /// Coalescing window for the file writer
    pub coalesce_window: Duration,
}

impl Config {
    /// Binary-format document at `path`: full value fidelity, synchronous
    /// first load, eager file creation.
    pub fn binary(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            encoder: std::sync::Arc::new(BinaryCodec),
            decoder: std::sync::Arc::new(BinaryCodec),
            cache_origin_data: true,
            read_synchronously: true,
            create_if_missing: true,
            cache_capacity: 20,
            cache_async: false,
            coalesce_window: DEFAULT_COALESCE_WINDOW,
        }
    }

    /// JSON-format document at `path`; same defaults as [`Config::binary`]
    /// but restricted to JSON-representable trees.
    pub fn json(path: impl Into<PathBuf>) -> Self {
        Self {
            encoder: std::sync::Arc::new(JsonCodec),
            decoder: std::sync::Arc::new(JsonCodec),
            ..Self::binary(path)
        }
    }

    pub(crate) fn cache_mode(&self) -> CacheMode {
        if self.cache_async {
            CacheMode::Asynchronous
        } else {
            CacheMode::Synchronous
        }
    }

    /// Validate all configuration parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("path must not be empty".into());
        }
        if self.cache_capacity == 0 {
            return Err("cache_capacity must be > 0".into());
        }
        if self.coalesce_window > Duration::from_secs(10) {
            return Err("coalesce_window must be <= 10s".into());
        }
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("cache_origin_data", &self.cache_origin_data)
            .field("read_synchronously", &self.read_synchronously)
            .field("create_if_missing", &self.create_if_missing)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_async", &self.cache_async)
            .field("coalesce_window", &self.coalesce_window)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_valid() {
        assert!(Config::binary("/tmp/prefs.bin").validate().is_ok());
        assert!(Config::json("/tmp/prefs.json").validate().is_ok());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let mut config = Config::binary("/tmp/prefs.bin");
        config.cache_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::binary("");
        config.path = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = Config::binary("/tmp/prefs.bin");
        config.coalesce_window = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_mode_mapping() {
        let mut config = Config::binary("/tmp/prefs.bin");
        assert_eq!(config.cache_mode(), CacheMode::Synchronous);
        config.cache_async = true;
        assert_eq!(config.cache_mode(), CacheMode::Asynchronous);
    }
}
