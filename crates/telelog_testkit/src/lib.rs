//! # Telelog Testkit
//!
//! Test utilities for telelog.
//!
//! This crate provides:
//! - Package fixtures on temporary directories
//! - A fault-injecting storage backend for append-failure tests
//! - Property-based test generators using proptest
//! - An in-memory transport for recorder tests without sockets
//!
//! ## Usage
//!
//! ```rust,ignore
//! use telelog_testkit::prelude::*;
//!
//! #[test]
//! fn reads_back() {
//!     let package = TestPackage::with_messages(&[("event", 100, "a")]);
//!     assert_eq!(package.close().get_msg_count(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faulty;
pub mod fixtures;
pub mod generators;
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::transport::*;
}

pub use faulty::*;
pub use fixtures::*;
pub use generators::*;
pub use transport::*;
