//! Error types for prefstore operations
//!
//! All prefstore failures are represented by the StoreError enum. Errors are
//! never thrown across thread boundaries: the component that observes a
//! failure reports it through an [`ErrorSink`], and read APIs fall back to
//! caller-supplied defaults.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Prefstore error types with detailed context
#[derive(Debug, Clone)]
pub enum StoreError {
    /// Reading the backing file failed
    Read {
        /// The file path where the error occurred
        path: PathBuf,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// Writing the backing file failed
    Write {
        /// The file path where the error occurred
        path: PathBuf,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// The serialization strategy rejected a value
    Encode {
        /// Description of what could not be encoded
        message: String,
    },

    /// Bytes did not match the expected document structure
    Decode {
        /// Description of the structural mismatch
        message: String,
        /// Byte offset where the mismatch was detected, when known
        offset: Option<u64>,
    },

    /// Mutation attempted before the first load completed
    NotReady,

    /// Key-path traversal hit a non-map value where a map was required
    TypeMismatch {
        /// The full key path being resolved
        key_path: String,
        /// The segment that could not be descended into
        segment: String,
        /// Type name of the value actually found there
        found: &'static str,
    },

    /// Array index outside the current bounds
    IndexOutOfRange {
        /// The requested index
        index: usize,
        /// Current element count
        len: usize,
    },

    /// Key path was empty after splitting on `.`
    InvalidKeyPath {
        /// The raw path as supplied by the caller
        raw: String,
    },

    /// Configuration failed validation at construction
    InvalidConfig {
        /// Which parameter was rejected and why
        message: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Read { path, kind, message } => {
                write!(f, "read error in {}: {} ({})", path.display(), message, kind)
            }

            StoreError::Write { path, kind, message } => {
                write!(f, "write error in {}: {} ({})", path.display(), message, kind)
            }

            StoreError::Encode { message } => {
                write!(f, "encode error: {}", message)
            }

            StoreError::Decode { message, offset } => {
                if let Some(offset) = offset {
                    write!(f, "decode error at offset {}: {}", offset, message)
                } else {
                    write!(f, "decode error: {}", message)
                }
            }

            StoreError::NotReady => {
                write!(f, "document not read completely; mutation rejected")
            }

            StoreError::TypeMismatch { key_path, segment, found } => {
                write!(
                    f,
                    "key path {:?}: segment {:?} is {} where a map was required",
                    key_path, segment, found
                )
            }

            StoreError::IndexOutOfRange { index, len } => {
                write!(f, "index {} out of range for array of length {}", index, len)
            }

            StoreError::InvalidKeyPath { raw } => {
                write!(f, "key path {:?} has no usable segments", raw)
            }

            StoreError::InvalidConfig { message } => {
                write!(f, "invalid configuration: {}", message)
            }
        }
    }
}

impl Error for StoreError {}

/// Result type alias for prefstore operations
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Build a Read error from an I/O error with path context.
    pub fn read(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        StoreError::Read {
            path: path.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Build a Write error from an I/O error with path context.
    pub fn write(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        StoreError::Write {
            path: path.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Coarse category, used for logging and for sink consumers that only
    /// care about the kind of failure.
    pub fn category(&self) -> &'static str {
        match self {
            StoreError::Read { .. } => "read",
            StoreError::Write { .. } => "write",
            StoreError::Encode { .. } => "encode",
            StoreError::Decode { .. } => "decode",
            StoreError::NotReady => "not-ready",
            StoreError::TypeMismatch { .. } => "type-mismatch",
            StoreError::IndexOutOfRange { .. } => "index-out-of-range",
            StoreError::InvalidKeyPath { .. } => "invalid-key-path",
            StoreError::InvalidConfig { .. } => "invalid-config",
        }
    }
}

/// Receiver for failures that occur away from the calling thread.
///
/// Readers, writers and documents hold an `Arc<dyn ErrorSink>` and report
/// every captured failure through it instead of panicking or returning
/// errors across worker boundaries.
pub trait ErrorSink: Send + Sync {
    /// Called once per captured failure, possibly from a background thread.
    fn store_error(&self, error: &StoreError);
}

/// Default sink: logs every failure through `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn store_error(&self, error: &StoreError) {
        tracing::warn!(category = error.category(), "prefstore error: {}", error);
    }
}

/// Shared sink handle used throughout the crate.
pub type SharedSink = Arc<dyn ErrorSink>;
