//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// The underlying volume has no space left.
    #[error("storage exhausted: {0}")]
    Exhausted(io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// The backend was opened read-only and cannot be written.
    #[error("storage is read-only")]
    ReadOnly,
}

impl StorageError {
    /// Returns true if the error means the volume is full.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::StorageFull {
            Self::Exhausted(err)
        } else {
            Self::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_full_maps_to_exhausted() {
        let err = StorageError::from(io::Error::new(io::ErrorKind::StorageFull, "disk full"));
        assert!(err.is_exhausted());
    }

    #[test]
    fn other_io_errors_stay_io() {
        let err = StorageError::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(matches!(err, StorageError::Io(_)));
        assert!(!err.is_exhausted());
    }
}
