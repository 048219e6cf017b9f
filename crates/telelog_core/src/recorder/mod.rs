//! Recording sessions.
//!
//! A session receives datagrams on a set of tagged channels and appends
//! them to rotating packages under one root directory:
//!
//! ```text
//!  channel "vision" ──rx thread──┐
//!  channel "ctrl"   ──rx thread──┼──► bounded queue ──► appender ──► PackageWriter
//!  record()  ────────────────────┴──────────────(writer lock)──────►
//! ```
//!
//! Receivers stamp each datagram with its arrival time before queueing it.
//! The appender and direct `record` calls share the writer lock, so the
//! package stays totally ordered.

mod receiver;
mod session;
mod stats;

pub use session::{ChannelMap, DirPackageFactory, PackageFactory, RecorderSession, StartSummary};
pub use stats::ChannelStats;
