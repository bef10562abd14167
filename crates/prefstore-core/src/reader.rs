//! One-shot reads of the backing file
//!
//! The reader has exactly two operations: a blocking whole-file read, and
//! the same read performed on a named background thread with the result
//! delivered through a callback. No caching, no partial reads, no
//! streaming — a document is always decoded from a complete byte snapshot.

use std::path::{Path, PathBuf};
use std::thread;

use crate::error::{StoreError, StoreResult};

/// Callback receiving the outcome of an asynchronous read.
///
/// Invoked exactly once, on the reader's background thread, never on the
/// thread that requested the read.
pub type ReadCallback = Box<dyn FnOnce(StoreResult<Vec<u8>>) + Send + 'static>;

/// Whole-file reader for a single backing path.
#[derive(Debug, Clone)]
pub struct FileReader {
    path: PathBuf,
}

impl FileReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file into memory on the calling thread.
    ///
    /// Fails with a read error if the file is missing or unreadable; a
    /// missing file is not special-cased here because the container checks
    /// existence before deciding to load at all.
    pub fn read_sync(&self) -> StoreResult<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| StoreError::read(&self.path, &e))
    }

    /// Perform [`FileReader::read_sync`] on a background thread and hand the
    /// result to `callback`.
    ///
    /// If the thread cannot be spawned the failure is logged and the
    /// callback never fires; the container stays in its not-ready state.
    pub fn read_async(&self, callback: ReadCallback) {
        let path = self.path.clone();
        let spawned = thread::Builder::new()
            .name("prefstore-reader".to_string())
            .spawn(move || {
                let result = std::fs::read(&path).map_err(|e| StoreError::read(&path, &e));
                callback(result);
            });

        if let Err(e) = spawned {
            tracing::warn!("failed to spawn reader thread: {}", e);
        }
    }
}
