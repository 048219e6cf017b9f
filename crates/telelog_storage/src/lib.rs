//! # Telelog Storage
//!
//! Byte-store backends underneath telelog log packages.
//!
//! Backends are **opaque, append-only byte stores**. They know nothing about
//! message records, index entries or footers; `telelog_core` owns the package
//! format and only uses the primitives defined here.
//!
//! ## Design Principles
//!
//! - Backends are simple byte stores (read, append, flush, truncate)
//! - A backend can hand out independent read handles for concurrent readers
//! - Must be `Send + Sync` so a package can be shared across threads
//! - Running out of space is reported as [`StorageError::Exhausted`], never as
//!   a generic I/O failure
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral packages
//! - [`FileBackend`] - For persistent packages using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use telelog_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
