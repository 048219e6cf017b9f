//! Package writer.
//!
//! The writer is the single serialization point of a package. Each append
//! goes through the same sequence:
//!
//! 1. Clamp the timestamp so the package stays non-decreasing
//! 2. Append the message record to `messages.tlm`
//! 3. Append a `Tag` record if the tag is new, then the `Entry` record
//! 4. Update the in-memory index and counters together
//!
//! If any write fails, both files are truncated back to their sizes before
//! the append and the writer refuses further appends.

use crate::config::WriterConfig;
use crate::dir::PackageDir;
use crate::error::{CoreError, CoreResult};
use crate::format::{encode_message, message_preamble, IndexRecord, INDEX_VERSION};
use crate::index::{IndexEntry, OrderedIndex, TagId};
use crate::message::{Message, Timestamp};
use crate::reader::{PackageReader, PackageStatus, PackageView};
use std::path::{Path, PathBuf};
use telelog_storage::{FileBackend, StorageBackend};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum WriterState {
    Open,
    Failed { message: String, rolled_back: bool },
    Closed,
}

/// Appends messages to one log package.
pub struct PackageWriter {
    name: String,
    path: Option<PathBuf>,
    created_at: Timestamp,
    messages: Box<dyn StorageBackend>,
    index_file: Box<dyn StorageBackend>,
    index: OrderedIndex,
    config: WriterConfig,
    state: WriterState,
    message_bytes: u64,
    clamped: u64,
    footer_written: bool,
}

impl PackageWriter {
    /// Creates a new package directory under `root` and opens a writer on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or its files cannot be created.
    pub fn create(root: &Path, config: WriterConfig) -> CoreResult<Self> {
        let dir = PackageDir::create(root)?;
        let messages = FileBackend::open(&dir.messages_path())?;
        let index_file = FileBackend::open(&dir.index_path())?;

        let mut writer = Self::with_backends(
            dir.name(),
            dir.created_at(),
            Box::new(messages),
            Box::new(index_file),
            config,
        )?;
        writer.messages.sync()?;
        writer.index_file.sync()?;
        dir.sync()?;
        writer.path = Some(dir.path().to_path_buf());

        info!(package = %writer.name, path = %dir.path().display(), "package created");
        Ok(writer)
    }

    /// Opens a writer on two empty backends and writes the file headers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if either backend already holds data, or a
    /// storage error if the headers cannot be written.
    pub fn with_backends(
        name: impl Into<String>,
        created_at: Timestamp,
        mut messages: Box<dyn StorageBackend>,
        mut index_file: Box<dyn StorageBackend>,
        config: WriterConfig,
    ) -> CoreResult<Self> {
        if messages.size()? != 0 || index_file.size()? != 0 {
            return Err(CoreError::invalid_operation(
                "package writer needs empty backends",
            ));
        }
        let name = name.into();

        let preamble = message_preamble();
        messages.append(&preamble)?;
        let header = IndexRecord::Header {
            version: INDEX_VERSION,
            created_at,
            name: name.clone(),
        };
        index_file.append(&header.encode()?)?;
        messages.flush()?;
        index_file.flush()?;

        Ok(Self {
            name,
            path: None,
            created_at,
            messages,
            index_file,
            index: OrderedIndex::new(),
            config,
            state: WriterState::Open,
            message_bytes: preamble.len() as u64,
            clamped: 0,
            footer_written: false,
        })
    }

    /// Package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package directory, if the writer was created on disk.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Creation time in nanoseconds since the Unix epoch.
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Number of messages appended.
    #[must_use]
    pub fn message_count(&self) -> u64 {
        self.index.len() as u64
    }

    /// Timestamp of the first message.
    #[must_use]
    pub fn start_timestamp(&self) -> Option<Timestamp> {
        self.index.start_timestamp()
    }

    /// Timestamp of the last message.
    #[must_use]
    pub fn end_timestamp(&self) -> Option<Timestamp> {
        self.index.end_timestamp()
    }

    /// Size of the message file in bytes.
    #[must_use]
    pub fn message_bytes(&self) -> u64 {
        self.message_bytes
    }

    /// Number of messages whose timestamp was raised to keep the package
    /// ordered.
    #[must_use]
    pub fn clamped_count(&self) -> u64 {
        self.clamped
    }

    /// Returns true once [`PackageWriter::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == WriterState::Closed
    }

    /// The failure that stopped this writer, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            WriterState::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Appends a message and returns its position.
    ///
    /// A timestamp below the package's current end timestamp is ordered at
    /// the end timestamp; the record keeps the original capture time.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the message cannot be encoded (nothing written)
    /// - a storage error if a write fails; the package is rolled back and the
    ///   writer fails
    /// - `SessionFailed` on a failed writer, `PackageClosed` on a closed one
    pub fn append(&mut self, message: Message) -> CoreResult<u64> {
        match &self.state {
            WriterState::Open => {}
            WriterState::Failed { message, .. } => {
                return Err(CoreError::session_failed(message.clone()))
            }
            WriterState::Closed => return Err(CoreError::PackageClosed),
        }

        let (message, clamped) = match self.index.end_timestamp() {
            Some(end) if message.timestamp() < end => (message.with_timestamp(end), true),
            _ => (message, false),
        };

        let (tag_id, new_tag) = match self.index.tag_id(message.tag()) {
            Some(id) => (id, false),
            None => (self.index.next_tag_id()?, true),
        };
        let record = encode_message(&message)?;
        let tag_record = if new_tag {
            let tag = IndexRecord::Tag {
                id: tag_id,
                name: message.tag().to_string(),
            };
            Some(tag.encode()?)
        } else {
            None
        };

        let marks = match self.size_marks() {
            Ok(marks) => marks,
            Err(e) => return Err(self.fail(e, None)),
        };
        let offset = match self.write_records(&record, tag_record.as_deref(), &message, tag_id) {
            Ok(offset) => offset,
            Err(e) => return Err(self.fail(e, Some(marks))),
        };

        if new_tag {
            self.index.intern_tag(message.tag())?;
        }
        let position = self.index.push(IndexEntry {
            timestamp: message.timestamp(),
            offset,
            tag_id,
        })?;
        self.message_bytes = offset + record.len() as u64;
        if clamped {
            self.clamped += 1;
            debug!(package = %self.name, tag = message.tag(), "timestamp clamped to package end");
        }

        Ok(position as u64)
    }

    fn size_marks(&self) -> CoreResult<(u64, u64)> {
        Ok((self.messages.size()?, self.index_file.size()?))
    }

    fn write_records(
        &mut self,
        record: &[u8],
        tag_record: Option<&[u8]>,
        message: &Message,
        tag_id: TagId,
    ) -> CoreResult<u64> {
        let offset = self.messages.append(record)?;
        if let Some(tag_record) = tag_record {
            self.index_file.append(tag_record)?;
        }
        let entry = IndexRecord::Entry {
            timestamp: message.timestamp(),
            offset,
            tag_id,
        };
        self.index_file.append(&entry.encode()?)?;

        if self.config.flush_on_append {
            self.messages.flush()?;
            self.index_file.flush()?;
        }
        Ok(offset)
    }

    /// Rolls both files back to `marks` and moves the writer to the failed
    /// state. Returns `err` for propagation.
    fn fail(&mut self, err: CoreError, marks: Option<(u64, u64)>) -> CoreError {
        let rolled_back = match marks {
            Some((messages_len, index_len)) => self
                .messages
                .truncate(messages_len)
                .and_then(|()| self.index_file.truncate(index_len))
                .is_ok(),
            None => false,
        };
        error!(
            package = %self.name,
            error = %err,
            rolled_back,
            "append failed, package writer stopped"
        );
        self.state = WriterState::Failed {
            message: err.to_string(),
            rolled_back,
        };
        err
    }

    /// Writes the footer, flushes and syncs both files.
    ///
    /// Calling `close` again is a no-op. A failed writer whose rollback did
    /// not complete is closed without a footer and stays partial.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the footer cannot be written or synced.
    /// The writer counts as closed either way.
    pub fn close(&mut self) -> CoreResult<()> {
        match &self.state {
            WriterState::Closed => return Ok(()),
            WriterState::Failed {
                rolled_back: false, ..
            } => {
                self.state = WriterState::Closed;
                warn!(package = %self.name, "closing failed package without footer");
                return Ok(());
            }
            _ => {}
        }
        self.state = WriterState::Closed;

        let footer = IndexRecord::Footer {
            message_count: self.message_count(),
            start_timestamp: self.start_timestamp().unwrap_or(0),
            end_timestamp: self.end_timestamp().unwrap_or(0),
        };
        let index_len = self.index_file.size()?;
        let written = footer
            .encode()
            .and_then(|bytes| Ok(self.index_file.append(&bytes)?))
            .and_then(|_| {
                self.messages.flush()?;
                self.index_file.flush()?;
                self.messages.sync()?;
                self.index_file.sync()?;
                Ok(())
            });

        match written {
            Ok(()) => {
                self.footer_written = true;
                info!(
                    package = %self.name,
                    messages = self.message_count(),
                    clamped = self.clamped,
                    "package closed"
                );
                Ok(())
            }
            Err(e) => {
                // A torn footer would read as a truncated tail anyway.
                if let Err(undo) = self.index_file.truncate(index_len) {
                    warn!(
                        package = %self.name,
                        error = %undo,
                        "failed to roll back partial footer"
                    );
                }
                error!(package = %self.name, error = %e, "failed to write package footer");
                Err(e)
            }
        }
    }

    /// A reader over every message appended so far.
    ///
    /// The snapshot copies the index, so later appends are not visible
    /// through it.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the message file cannot be reopened.
    pub fn snapshot(&mut self) -> CoreResult<PackageReader> {
        if !self.is_closed() {
            self.messages.flush()?;
        }
        let status = if self.footer_written {
            PackageStatus::Clean
        } else {
            PackageStatus::Partial
        };
        Ok(PackageReader::from_view(PackageView::new(
            self.name.clone(),
            self.path.clone(),
            self.created_at,
            status,
            self.index.clone(),
            self.messages.read_handle()?,
        )))
    }
}

impl Drop for PackageWriter {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                warn!(package = %self.name, error = %e, "package close on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for PackageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageWriter")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("state", &self.state)
            .field("message_count", &self.message_count())
            .finish_non_exhaustive()
    }
}
