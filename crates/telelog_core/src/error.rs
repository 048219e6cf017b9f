//! Error types for telelog core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while recording or reading log packages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(telelog_storage::StorageError),

    /// I/O error outside the storage backends (directory scans, sockets).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The output volume is full. Fatal for the recording session.
    #[error("storage exhausted: {message}")]
    StorageExhausted {
        /// Description of the failed write.
        message: String,
    },

    /// Bad or conflicting recorder configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// A channel endpoint could not be opened.
    #[error("cannot bind channel '{tag}' to {endpoint}: {source}")]
    Bind {
        /// Tag of the channel that failed.
        tag: String,
        /// Endpoint that could not be opened.
        endpoint: String,
        /// Underlying socket error.
        source: io::Error,
    },

    /// A cursor step left the valid position range.
    #[error("cursor step out of range: position {position}, step {step}, {len} messages")]
    OutOfRange {
        /// Position before the step.
        position: u64,
        /// Requested step (negative when moving backwards).
        step: i128,
        /// Number of messages visible to the cursor.
        len: u64,
    },

    /// Package or catalog root not found.
    #[error("not found: {path}")]
    NotFound {
        /// The missing path.
        path: String,
    },

    /// Package contents are corrupted.
    #[error("package corruption: {message}")]
    PackageCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Invalid package format or version.
    #[error("invalid package format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Invalid argument supplied by the caller.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The recording session stopped after a fatal append failure.
    #[error("recording session failed: {message}")]
    SessionFailed {
        /// The original failure.
        message: String,
    },

    /// The package has been closed and no longer accepts appends.
    #[error("package is closed")]
    PackageClosed,
}

impl From<telelog_storage::StorageError> for CoreError {
    fn from(err: telelog_storage::StorageError) -> Self {
        if err.is_exhausted() {
            Self::StorageExhausted {
                message: err.to_string(),
            }
        } else {
            Self::Storage(err)
        }
    }
}

impl CoreError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a bind error for a channel.
    pub fn bind(tag: impl Into<String>, endpoint: impl ToString, source: io::Error) -> Self {
        Self::Bind {
            tag: tag.into(),
            endpoint: endpoint.to_string(),
            source,
        }
    }

    /// Creates a not found error.
    pub fn not_found(path: impl AsRef<std::path::Path>) -> Self {
        Self::NotFound {
            path: path.as_ref().display().to_string(),
        }
    }

    /// Creates a package corruption error.
    pub fn package_corruption(message: impl Into<String>) -> Self {
        Self::PackageCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a session failed error.
    pub fn session_failed(message: impl Into<String>) -> Self {
        Self::SessionFailed {
            message: message.into(),
        }
    }

    /// Returns true for errors the caller can retry or ignore without
    /// losing recorded data (cursor bounds, missing packages, bad arguments).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::OutOfRange { .. } | Self::NotFound { .. } | Self::InvalidArgument { .. }
        )
    }

    /// Returns true if the error must terminate a recording session.
    #[must_use]
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::StorageExhausted { .. } | Self::Io(_)
        )
    }
}
