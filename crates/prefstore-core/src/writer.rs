//! Coalescing file writer — at most one physical write per window
//!
//! `write()` stores the latest serialized snapshot in a single pending slot
//! and returns immediately. One dedicated worker thread per writer drains
//! the slot: it wakes when bytes arrive, sleeps out the coalescing window
//! so later writes can overwrite the slot, then performs one physical
//! whole-file write of whatever the slot holds at that point. N writes
//! inside one window therefore produce exactly one write of the Nth
//! payload.
//!
//! The pending slot doubles as the wait signal: because it holds at most
//! one snapshot, a backlog of wakeups cannot accumulate no matter how many
//! writes land between worker cycles.
//!
//! Write failures are reported through the error sink and the failed bytes
//! are dropped — there is no automatic retry; the next `write()` supplies
//! a fresh snapshot derived from current state.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{SharedSink, StoreError, StoreResult};

/// Default coalescing window. Small enough to be invisible to callers,
/// large enough to merge a burst of mutations into one write.
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(4);

struct WriterState {
    /// Latest snapshot awaiting a physical write; newer writes replace it
    pending: Option<Vec<u8>>,
    /// False once shutdown has been requested
    running: bool,
    /// True while the worker is inside the physical write
    in_flight: bool,
}

struct Shared {
    path: PathBuf,
    window: Duration,
    state: Mutex<WriterState>,
    cond: Condvar,
    /// Writes submitted through `write()`
    submitted: AtomicU64,
    /// Physical file writes performed
    physical: AtomicU64,
    sink: SharedSink,
}

/// Write-coalescing worker bound to one backing file.
///
/// Dropping the writer requests shutdown, drains any pending snapshot and
/// joins the worker thread.
pub struct CoalescingWriter {
    shared: Arc<Shared>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CoalescingWriter {
    /// Spawn the worker thread for `path`.
    pub fn new(path: impl Into<PathBuf>, window: Duration, sink: SharedSink) -> StoreResult<Self> {
        let path = path.into();
        let shared = Arc::new(Shared {
            path: path.clone(),
            window,
            state: Mutex::new(WriterState {
                pending: None,
                running: true,
                in_flight: false,
            }),
            cond: Condvar::new(),
            submitted: AtomicU64::new(0),
            physical: AtomicU64::new(0),
            sink,
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("prefstore-writer".to_string())
            .spawn(move || write_loop(worker_shared))
            .map_err(|e| StoreError::Write {
                path,
                kind: std::io::ErrorKind::Other,
                message: format!("failed to spawn writer thread: {}", e),
            })?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Submit the latest serialized snapshot. Never blocks the caller
    /// beyond the brief slot lock; safe from any thread.
    ///
    /// After `close()` the bytes are dropped: the worker is gone, and a
    /// snapshot left in the slot would make a later `flush()` wait forever.
    pub fn write(&self, bytes: Vec<u8>) {
        let mut state = self.shared.state.lock();
        if !state.running {
            return;
        }
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        state.pending = Some(bytes);
        self.shared.cond.notify_all();
    }

    /// Block until no snapshot is pending and no write is in flight.
    pub fn flush(&self) {
        let mut state = self.shared.state.lock();
        while state.pending.is_some() || state.in_flight {
            self.shared.cond.wait(&mut state);
        }
    }

    /// Request shutdown, drain the pending snapshot and join the worker.
    /// Idempotent; also invoked from `Drop`.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            state.running = false;
            self.shared.cond.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    /// Snapshots submitted through `write()` since creation.
    pub fn submitted_writes(&self) -> u64 {
        self.shared.submitted.load(Ordering::Relaxed)
    }

    /// Physical file writes performed since creation.
    pub fn physical_writes(&self) -> u64 {
        self.shared.physical.load(Ordering::Relaxed)
    }
}

impl Drop for CoalescingWriter {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_loop(shared: Arc<Shared>) {
    loop {
        // Wait for a snapshot or for shutdown.
        let still_running = {
            let mut state = shared.state.lock();
            while state.pending.is_none() && state.running {
                shared.cond.wait(&mut state);
            }
            if state.pending.is_none() && !state.running {
                return;
            }
            state.running
        };

        // Coalescing window: later writes replace the pending slot while we
        // sleep. Skipped during shutdown so close() drains promptly.
        if still_running && !shared.window.is_zero() {
            thread::sleep(shared.window);
        }

        let bytes = {
            let mut state = shared.state.lock();
            let bytes = state.pending.take();
            state.in_flight = bytes.is_some();
            bytes
        };

        if let Some(bytes) = bytes {
            match std::fs::write(&shared.path, &bytes) {
                Ok(()) => {
                    shared.physical.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        path = %shared.path.display(),
                        bytes = bytes.len(),
                        "flushed document"
                    );
                }
                Err(e) => {
                    shared.sink.store_error(&StoreError::write(&shared.path, &e));
                }
            }

            let mut state = shared.state.lock();
            state.in_flight = false;
            shared.cond.notify_all();
        }
    }
}
