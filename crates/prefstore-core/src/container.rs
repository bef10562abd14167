//! Container — owns the in-memory document and its load/store cycle
//!
//! A container holds the authoritative snapshot of one document tree and
//! orchestrates the read-on-start, decode, re-encode-on-write path between
//! the [`FileReader`] and the [`CoalescingWriter`].
//!
//! State machine: construction triggers exactly one load. An absent backing
//! file makes the container write-ready immediately (optionally creating
//! the file with the encoded default before the constructor returns); an
//! existing file is loaded synchronously or asynchronously per the
//! configuration, and only a successful decode flips the ready flag.
//! `set_container` before that flip fails with `NotReady` so not-yet-read
//! disk state cannot be clobbered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{SharedSink, StoreError, StoreResult};
use crate::reader::FileReader;
use crate::value::Value;
use crate::writer::CoalescingWriter;

struct ContainerShared {
    /// Authoritative in-memory snapshot, exclusive access only
    current: Mutex<Value>,
    /// False until the first load completes
    ready: AtomicBool,
    /// Keep decoded data in `current` (vs. re-decode per read)
    cache_origin_data: bool,
    decoder: crate::codec::SharedDecoder,
    sink: SharedSink,
}

impl ContainerShared {
    /// Decode freshly read bytes. A successful decode completes the load:
    /// the container becomes write-ready and, when configured to, adopts
    /// the decoded tree as the in-memory snapshot.
    fn ingest(&self, bytes: &[u8]) -> Option<Value> {
        match self.decoder.decode(bytes) {
            Ok(value) => {
                self.ready.store(true, Ordering::Release);
                if self.cache_origin_data {
                    *self.current.lock() = value.clone();
                }
                Some(value)
            }
            Err(e) => {
                self.sink.store_error(&e);
                None
            }
        }
    }
}

/// Owner of one document tree backed by one file.
pub struct Container {
    shared: Arc<ContainerShared>,
    reader: FileReader,
    writer: CoalescingWriter,
    config: Config,
}

impl Container {
    /// Create the container and trigger its single initial load.
    ///
    /// Failures during the load (missing permissions, corrupt bytes) are
    /// reported through the sink, never returned: the constructor only
    /// fails for an invalid configuration or an unspawnable writer.
    pub fn new(initial: Value, config: Config, sink: SharedSink) -> StoreResult<Self> {
        if let Err(message) = config.validate() {
            return Err(StoreError::InvalidConfig { message });
        }

        let reader = FileReader::new(&config.path);
        let writer =
            CoalescingWriter::new(&config.path, config.coalesce_window, Arc::clone(&sink))?;

        let shared = Arc::new(ContainerShared {
            current: Mutex::new(initial),
            ready: AtomicBool::new(false),
            cache_origin_data: config.cache_origin_data,
            decoder: Arc::clone(&config.decoder),
            sink,
        });

        let container = Self { shared, reader, writer, config };
        container.prepare();
        Ok(container)
    }

    fn prepare(&self) {
        if !self.config.path.exists() {
            // Nothing on disk to protect: immediately write-ready.
            self.shared.ready.store(true, Ordering::Release);
            if self.config.create_if_missing {
                let snapshot = self.shared.current.lock().clone();
                match self.config.encoder.encode(&snapshot) {
                    Ok(bytes) => {
                        if let Err(e) = std::fs::write(&self.config.path, &bytes) {
                            self.shared
                                .sink
                                .store_error(&StoreError::write(&self.config.path, &e));
                        }
                    }
                    Err(e) => self.shared.sink.store_error(&e),
                }
            }
            return;
        }

        if self.config.read_synchronously {
            match self.reader.read_sync() {
                Ok(bytes) => {
                    self.shared.ingest(&bytes);
                }
                Err(e) => self.shared.sink.store_error(&e),
            }
        } else {
            let shared = Arc::clone(&self.shared);
            self.reader.read_async(Box::new(move |result| match result {
                Ok(bytes) => {
                    shared.ingest(&bytes);
                }
                Err(e) => shared.sink.store_error(&e),
            }));
        }
    }

    /// True once the first load has completed (or was unnecessary).
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    /// Clone of the current in-memory snapshot.
    pub fn snapshot(&self) -> Value {
        self.shared.current.lock().clone()
    }

    /// Replace the document and persist it through the coalescing writer.
    ///
    /// Returns `Err(NotReady)` before the first load completes; encode
    /// failures are sink-reported and leave the previous bytes on disk.
    pub fn set_container(&self, value: Value) -> StoreResult<()> {
        if !self.is_ready() {
            return Err(StoreError::NotReady);
        }

        if self.config.cache_origin_data {
            *self.shared.current.lock() = value.clone();
        }

        match self.config.encoder.encode(&value) {
            Ok(bytes) => self.writer.write(bytes),
            Err(e) => self.shared.sink.store_error(&e),
        }
        Ok(())
    }

    /// Re-read and decode the backing file on the calling thread.
    ///
    /// Used for every read when `cache_origin_data` is off. A successful
    /// decode also completes a still-pending initial load.
    pub fn read_container_sync(&self) -> Option<Value> {
        match self.reader.read_sync() {
            Ok(bytes) => self.shared.ingest(&bytes),
            Err(e) => {
                self.shared.sink.store_error(&e);
                None
            }
        }
    }

    /// The tree reads should resolve against: the in-memory snapshot when
    /// origin data is cached, a fresh decode from disk otherwise.
    pub fn current_tree(&self) -> Option<Value> {
        if self.config.cache_origin_data {
            Some(self.snapshot())
        } else {
            self.read_container_sync()
        }
    }

    /// The tree a read-modify-write cycle must start from.
    ///
    /// When origin data is not cached the writer is drained first, so a
    /// mutation inside the coalescing window of a previous one rebuilds
    /// from that write's bytes rather than from stale disk state.
    pub(crate) fn tree_for_update(&self) -> Option<Value> {
        if self.config.cache_origin_data {
            Some(self.snapshot())
        } else {
            self.writer.flush();
            self.read_container_sync()
        }
    }

    /// Block until every submitted write has reached the file.
    pub fn flush(&self) {
        self.writer.flush();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn sink(&self) -> &SharedSink {
        &self.shared.sink
    }

    /// The coalescing writer, exposed for statistics.
    pub fn writer(&self) -> &CoalescingWriter {
        &self.writer
    }
}
