//! Read access to log packages.
//!
//! A [`PackageReader`] is a cheap handle on an immutable, shared view of one
//! package: the decoded index plus a read-only handle on the message file.
//! Cursors, iterators and filter results all hold the same view, so they
//! never take a lock and never interfere with each other.

use crate::cursor::MessageCursor;
use crate::dir::PackageDir;
use crate::error::{CoreError, CoreResult};
use crate::filter::{Filter, Selection};
use crate::format::{
    decode_message_at, validate_preamble, IndexRecord, IndexRecordIterator, MESSAGE_PREAMBLE_SIZE,
};
use crate::index::{IndexEntry, OrderedIndex};
use crate::message::{Message, Timestamp};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use telelog_storage::{FileBackend, StorageBackend};

/// Whether a package was closed cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    /// The footer is present and consistent with the index.
    Clean,
    /// No footer: the package is still being written or its writer crashed.
    /// Readable content is every complete index entry.
    Partial,
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => f.write_str("clean"),
            Self::Partial => f.write_str("partial"),
        }
    }
}

/// Summary of a package, available without reading any payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogInfo {
    /// Package name.
    pub name: String,
    /// Clean or partial.
    pub status: PackageStatus,
    /// Number of messages.
    pub message_count: u64,
    /// Timestamp of the first message, if any.
    pub start_timestamp: Option<Timestamp>,
    /// Timestamp of the last message, if any.
    pub end_timestamp: Option<Timestamp>,
    /// Creation time from the package header.
    pub created_at: Timestamp,
}

/// Per-tag statistics of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSummary {
    /// Tag name.
    pub tag: String,
    /// Number of messages with this tag.
    pub count: u64,
    /// Timestamp of the first message with this tag.
    pub start_timestamp: Option<Timestamp>,
    /// Timestamp of the last message with this tag.
    pub end_timestamp: Option<Timestamp>,
}

/// Shared, immutable state behind readers and cursors.
pub(crate) struct PackageView {
    path: Option<PathBuf>,
    info: LogInfo,
    index: OrderedIndex,
    messages: Box<dyn StorageBackend>,
}

impl PackageView {
    pub(crate) fn new(
        name: String,
        path: Option<PathBuf>,
        created_at: Timestamp,
        status: PackageStatus,
        index: OrderedIndex,
        messages: Box<dyn StorageBackend>,
    ) -> Self {
        let info = LogInfo {
            name,
            status,
            message_count: index.len() as u64,
            start_timestamp: index.start_timestamp(),
            end_timestamp: index.end_timestamp(),
            created_at,
        };
        Self {
            path,
            info,
            index,
            messages,
        }
    }

    pub(crate) fn index(&self) -> &OrderedIndex {
        &self.index
    }

    pub(crate) fn len(&self) -> u64 {
        self.info.message_count
    }

    /// Reads the message at `position`, checking it against its index entry.
    pub(crate) fn read(&self, position: usize) -> CoreResult<Message> {
        let entry = self.index.get(position).ok_or(CoreError::OutOfRange {
            position: position as u64,
            step: 0,
            len: self.len(),
        })?;
        let message = decode_message_at(self.messages.as_ref(), entry.offset)?;

        let expected_tag = self.index.tag_name(entry.tag_id).unwrap_or_default();
        if message.tag() != expected_tag || message.timestamp() != entry.timestamp {
            return Err(CoreError::package_corruption(format!(
                "message at offset {} does not match its index entry",
                entry.offset
            )));
        }
        Ok(message)
    }
}

impl fmt::Debug for PackageView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageView")
            .field("path", &self.path)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Decoded contents of an index file.
pub(crate) struct LoadedIndex {
    pub(crate) name: String,
    pub(crate) created_at: Timestamp,
    pub(crate) status: PackageStatus,
    pub(crate) index: OrderedIndex,
}

/// Decodes an index file, validating every entry against the message file
/// size.
///
/// A truncated tail ends the index. Records after a footer, a footer whose
/// count disagrees with the entries, or any checksum failure is corruption.
pub(crate) fn load_index(
    index_file: &dyn StorageBackend,
    messages_size: u64,
) -> CoreResult<LoadedIndex> {
    let mut records = IndexRecordIterator::new(index_file, 0)?;

    let (name, created_at) = match records.next() {
        Some(Ok((_, IndexRecord::Header {
            created_at, name, ..
        }))) => (name, created_at),
        Some(Ok(_)) => return Err(CoreError::invalid_format("index does not start with a header")),
        Some(Err(e)) => return Err(e),
        None => return Err(CoreError::invalid_format("index header missing")),
    };

    let mut index = OrderedIndex::new();
    let mut footer_seen = false;

    for result in records {
        let (offset, record) = result?;
        if footer_seen {
            return Err(CoreError::package_corruption(format!(
                "index record at offset {offset} follows the footer"
            )));
        }
        match record {
            IndexRecord::Header { .. } => {
                return Err(CoreError::package_corruption(format!(
                    "second header at index offset {offset}"
                )));
            }
            IndexRecord::Tag { id, name } => index.define_tag(id, name)?,
            IndexRecord::Entry {
                timestamp,
                offset: message_offset,
                tag_id,
            } => {
                if message_offset < MESSAGE_PREAMBLE_SIZE || message_offset >= messages_size {
                    return Err(CoreError::package_corruption(format!(
                        "index entry points at offset {message_offset} outside message file of {messages_size} bytes"
                    )));
                }
                index.push(IndexEntry {
                    timestamp,
                    offset: message_offset,
                    tag_id,
                })?;
            }
            IndexRecord::Footer {
                message_count,
                start_timestamp,
                end_timestamp,
            } => {
                let consistent = message_count == index.len() as u64
                    && (index.is_empty()
                        || (index.start_timestamp() == Some(start_timestamp)
                            && index.end_timestamp() == Some(end_timestamp)));
                if !consistent {
                    return Err(CoreError::package_corruption(format!(
                        "footer claims {message_count} messages, index holds {}",
                        index.len()
                    )));
                }
                footer_seen = true;
            }
        }
    }

    Ok(LoadedIndex {
        name,
        created_at,
        status: if footer_seen {
            PackageStatus::Clean
        } else {
            PackageStatus::Partial
        },
        index,
    })
}

/// Random-access, filtered reader over one package.
///
/// Cloning a reader is cheap; clones share the loaded index.
///
/// # Example
///
/// ```rust,ignore
/// use telelog_core::{Filter, PackageReader};
///
/// let reader = PackageReader::open(Path::new("logs/Rec_2026-10-18_09-30-12-104233"))?;
/// let mut cursor = reader.select_msg(1_760_000_000_000_000_000);
/// while let Some(msg) = cursor.msg()? {
///     println!("{} {}", msg.tag(), msg.payload().len());
///     if cursor.next(1).is_err() {
///         break;
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PackageReader {
    view: Arc<PackageView>,
}

impl PackageReader {
    /// Opens the package directory at `path` and loads its index.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the directory or one of its files is missing,
    /// `InvalidFormat` for a bad preamble or header, and a corruption error
    /// if the index is damaged.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let dir = PackageDir::open(path)?;
        let (messages_path, index_path) = (dir.messages_path(), dir.index_path());
        for file in [&messages_path, &index_path] {
            if !file.is_file() {
                return Err(CoreError::not_found(file));
            }
        }

        let messages = FileBackend::open_read_only(&messages_path)?;
        let index_file = FileBackend::open_read_only(&index_path)?;
        Self::load(Some(path.to_path_buf()), Box::new(messages), &index_file)
    }

    /// Builds a reader from raw backends, e.g. in-memory ones.
    ///
    /// # Errors
    ///
    /// Same as [`PackageReader::open`], minus `NotFound`.
    pub fn from_backends(
        messages: Box<dyn StorageBackend>,
        index_file: &dyn StorageBackend,
    ) -> CoreResult<Self> {
        Self::load(None, messages, index_file)
    }

    fn load(
        path: Option<PathBuf>,
        messages: Box<dyn StorageBackend>,
        index_file: &dyn StorageBackend,
    ) -> CoreResult<Self> {
        validate_preamble(messages.as_ref())?;
        let loaded = load_index(index_file, messages.size()?)?;
        Ok(Self::from_view(PackageView::new(
            loaded.name,
            path,
            loaded.created_at,
            loaded.status,
            loaded.index,
            messages,
        )))
    }

    pub(crate) fn from_view(view: PackageView) -> Self {
        Self {
            view: Arc::new(view),
        }
    }

    /// Package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.view.info.name
    }

    /// Package directory, if the reader was opened from disk.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.view.path.as_deref()
    }

    /// Package summary.
    #[must_use]
    pub fn info(&self) -> &LogInfo {
        &self.view.info
    }

    /// Package summary as an owned value.
    #[must_use]
    pub fn get_log_info(&self) -> LogInfo {
        self.view.info.clone()
    }

    /// Number of messages.
    #[must_use]
    pub fn get_msg_count(&self) -> u64 {
        self.view.len()
    }

    /// Clean or partial.
    #[must_use]
    pub fn status(&self) -> PackageStatus {
        self.view.info.status
    }

    /// Known tags in order of first appearance.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        self.view.index.tags()
    }

    /// Per-tag message counts and time ranges, in order of first appearance.
    #[must_use]
    pub fn tag_summary(&self) -> Vec<TagSummary> {
        let index = &self.view.index;
        let timestamp_of = |p: Option<&usize>| p.and_then(|&p| index.get(p)).map(|e| e.timestamp);
        index
            .tags()
            .iter()
            .map(|tag| {
                let positions = index.positions_for_tag(tag);
                TagSummary {
                    tag: tag.clone(),
                    count: positions.len() as u64,
                    start_timestamp: timestamp_of(positions.first()),
                    end_timestamp: timestamp_of(positions.last()),
                }
            })
            .collect()
    }

    /// Reads the message at `position`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` past the last message, or a storage or
    /// corruption error.
    pub fn message(&self, position: u64) -> CoreResult<Message> {
        let position = usize::try_from(position).map_err(|_| CoreError::OutOfRange {
            position,
            step: 0,
            len: self.view.len(),
        })?;
        self.view.read(position)
    }

    /// Cursor on the message with the greatest timestamp `<= timestamp`.
    ///
    /// Ties go to the first message in write order. A timestamp before the
    /// package selects the first message, one after it the last. On an empty
    /// package the cursor is empty.
    #[must_use]
    pub fn select_msg(&self, timestamp: Timestamp) -> MessageCursor {
        let position = self.view.index.select(timestamp);
        MessageCursor::new(Arc::clone(&self.view), position)
    }

    /// Cursor on the first message (empty cursor on an empty package).
    #[must_use]
    pub fn cursor(&self) -> MessageCursor {
        let position = if self.view.index.is_empty() {
            None
        } else {
            Some(0)
        };
        MessageCursor::new(Arc::clone(&self.view), position)
    }

    /// Lazily reads every message in ascending order.
    #[must_use]
    pub fn iter(&self) -> Messages {
        Messages {
            view: Arc::clone(&self.view),
            next: 0,
            end: self.view.index.len(),
        }
    }

    /// Alias of [`PackageReader::iter`].
    #[must_use]
    pub fn read_logs(&self) -> Messages {
        self.iter()
    }

    /// Lazily reads the messages matching `filter`, ascending by position.
    #[must_use]
    pub fn filter(&self, filter: &Filter) -> Filtered {
        Filtered {
            selection: Selection::plan(&self.view.index, filter),
            view: Arc::clone(&self.view),
        }
    }

    /// Positions of the messages matching `filter`, without reading them.
    #[must_use]
    pub fn filter_positions(&self, filter: &Filter) -> Vec<u64> {
        let index = &self.view.index;
        let mut selection = Selection::plan(index, filter);
        std::iter::from_fn(|| selection.next_position(index))
            .map(|p| p as u64)
            .collect()
    }
}

/// Ascending iterator over every message of a package.
///
/// Yields an error for a message that cannot be read and continues with
/// the next one.
#[derive(Debug)]
pub struct Messages {
    view: Arc<PackageView>,
    next: usize,
    end: usize,
}

impl Iterator for Messages {
    type Item = CoreResult<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let position = self.next;
        self.next += 1;
        Some(self.view.read(position))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Messages {}

/// Iterator over the messages matching a [`Filter`].
#[derive(Debug)]
pub struct Filtered {
    view: Arc<PackageView>,
    selection: Selection,
}

impl Iterator for Filtered {
    type Item = CoreResult<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.selection.next_position(&self.view.index)?;
        Some(self.view.read(position))
    }
}
