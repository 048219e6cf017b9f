//! # Telelog Core
//!
//! Recorder and reader for tagged telemetry streams.
//!
//! This crate provides:
//! - Log packages: an append-only message file plus an ordered index
//! - [`PackageWriter`] for appending and cleanly closing packages
//! - [`PackageReader`] with timestamp selection, cursors and filtered queries
//! - [`RecorderSession`] for recording UDP/multicast channels into rotating
//!   packages
//! - A catalog for finding packages under a recording root
//!
//! ## Example
//!
//! ```rust,no_run
//! use telelog_core::{catalog, Filter};
//! use std::path::Path;
//!
//! let reader = catalog::open_latest(Path::new("logs"))?.expect("no packages");
//! for message in reader.filter(&Filter::new().tag("vision").count(10)) {
//!     let message = message?;
//!     println!("{} {} bytes", message.timestamp(), message.payload().len());
//! }
//! # Ok::<(), telelog_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
mod config;
mod cursor;
mod dir;
mod error;
mod filter;
pub mod format;
mod index;
mod message;
mod reader;
mod recorder;
mod transport;
mod writer;

pub use catalog::PackageEntry;
pub use config::{BackpressurePolicy, RecorderConfig, WriterConfig};
pub use cursor::MessageCursor;
pub use dir::{package_name, PackageDir, PACKAGE_PREFIX};
pub use error::{CoreError, CoreResult};
pub use filter::{Bound, Filter};
pub use index::{IndexEntry, OrderedIndex, TagId};
pub use message::{now_nanos, Message, Timestamp};
pub use reader::{Filtered, LogInfo, Messages, PackageReader, PackageStatus, TagSummary};
pub use recorder::{
    ChannelMap, ChannelStats, DirPackageFactory, PackageFactory, RecorderSession, StartSummary,
};
pub use transport::{
    Datagram, Endpoint, Transport, TransportFactory, UdpTransport, UdpTransportFactory,
};
pub use writer::PackageWriter;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
