//! On-disk layout of a log package.
//!
//! A package is a directory holding two append-only files:
//!
//! ```text
//! Rec_2026-10-18_09-30-12-104233/
//! ├─ messages.tlm   # message block area
//! └─ index.tlx      # header, ordered index, footer
//! ```
//!
//! ## Message block (`messages.tlm`)
//!
//! ```text
//! | magic "TLGM" (4) | version (2) |
//! | len (4) | timestamp (8) | tag_len (2) | tag | source_len (2) | source | payload | crc32 (4) |
//! | ... one record per message ...
//! ```
//!
//! `len` counts the bytes between the length field and the CRC. Index entries
//! point at the `len` field of their record.
//!
//! ## Index (`index.tlx`)
//!
//! Every index record shares one envelope:
//!
//! ```text
//! | type (1) | length (4) | body (N) | crc32 (4) |
//! ```
//!
//! - `Header` (first record): magic, format version, creation time, name
//! - `Tag`: assigns a numeric id to a tag the first time it is written
//! - `Entry`: `{timestamp, offset, tag_id}`, one per message, in write order
//! - `Footer` (last record, written on clean close only): message count and
//!   first/last timestamps
//!
//! ## Recovery Policy
//!
//! Mirrors a write-ahead log: a record cut short at the end of the file is
//! the clean end of data (a crash mid-append), while a CRC mismatch, an
//! unknown record type, bad magic or a future version is corruption and the
//! package refuses to open. A package without a footer is `Partial`; its
//! readable content is every complete entry.
//!
//! ## Append Order
//!
//! The writer appends the message record first and the index entry second.
//! A crash between the two leaves unreachable bytes at the tail of
//! `messages.tlm`, never an index entry pointing at missing data.

mod iterator;
mod message_block;
mod record;

pub use iterator::IndexRecordIterator;
pub use message_block::{
    decode_message_at, encode_message, message_preamble, validate_preamble, MESSAGE_MAGIC,
    MESSAGE_PREAMBLE_SIZE, MESSAGE_VERSION,
};
pub use record::{
    compute_crc32, IndexRecord, IndexRecordType, FOOTER_RECORD_SIZE, INDEX_MAGIC, INDEX_VERSION,
};

/// File holding the message block area.
pub const MESSAGES_FILE: &str = "messages.tlm";

/// File holding the header, index and footer.
pub const INDEX_FILE: &str = "index.tlx";
