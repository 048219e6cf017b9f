//! Test fixtures and package helpers.
//!
//! Provides convenience types for writing packages into temporary
//! directories and reading them back.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use telelog_core::{Message, PackageReader, PackageWriter, Timestamp, WriterConfig};
use tempfile::TempDir;

/// A package being written into its own temporary recording root.
pub struct TestPackage {
    writer: PackageWriter,
    temp_dir: TempDir,
}

impl TestPackage {
    /// Creates an empty package.
    pub fn new() -> Self {
        Self::with_config(WriterConfig::default())
    }

    /// Creates an empty package with a custom writer configuration.
    pub fn with_config(config: WriterConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let writer =
            PackageWriter::create(temp_dir.path(), config).expect("Failed to create package");
        Self { writer, temp_dir }
    }

    /// Creates a package holding `(tag, timestamp, payload)` messages.
    pub fn with_messages(messages: &[(&str, Timestamp, &str)]) -> Self {
        let mut package = Self::new();
        for (tag, timestamp, payload) in messages {
            package.append(tag, *timestamp, payload.as_bytes());
        }
        package
    }

    /// Appends one message and returns its position.
    pub fn append(&mut self, tag: &str, timestamp: Timestamp, payload: &[u8]) -> u64 {
        self.writer
            .append(Message::new(tag, "127.0.0.1:9", timestamp, payload))
            .expect("Failed to append message")
    }

    /// The writer, for tests that drive it directly.
    pub fn writer(&mut self) -> &mut PackageWriter {
        &mut self.writer
    }

    /// The recording root holding the package.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The package directory.
    pub fn path(&self) -> PathBuf {
        self.writer
            .path()
            .expect("Package is file-backed")
            .to_path_buf()
    }

    /// A reader over what has been appended so far.
    pub fn snapshot(&mut self) -> PackageReader {
        self.writer.snapshot().expect("Failed to snapshot package")
    }

    /// Closes the package cleanly and reopens it from disk.
    pub fn close(mut self) -> ClosedPackage {
        self.writer.close().expect("Failed to close package");
        self.reopen()
    }

    /// Abandons the writer without a footer, as a crash would, and reopens
    /// the package from disk.
    pub fn crash(self) -> ClosedPackage {
        let path = self.path();
        let Self { writer, temp_dir } = self;
        // skip Drop so no footer is written
        std::mem::forget(writer);
        ClosedPackage {
            reader: PackageReader::open(&path).expect("Failed to reopen package"),
            _temp_dir: temp_dir,
        }
    }

    fn reopen(self) -> ClosedPackage {
        let path = self.path();
        let Self { writer, temp_dir } = self;
        drop(writer);
        ClosedPackage {
            reader: PackageReader::open(&path).expect("Failed to reopen package"),
            _temp_dir: temp_dir,
        }
    }
}

impl Default for TestPackage {
    fn default() -> Self {
        Self::new()
    }
}

/// A package reopened from disk; keeps its temporary directory alive.
pub struct ClosedPackage {
    reader: PackageReader,
    _temp_dir: TempDir,
}

impl ClosedPackage {
    /// The recording root holding the package.
    pub fn root(&self) -> &Path {
        self._temp_dir.path()
    }
}

impl Deref for ClosedPackage {
    type Target = PackageReader;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

/// Runs a test with a temporary recording root.
///
/// # Example
///
/// ```rust,ignore
/// use telelog_testkit::with_temp_root;
///
/// with_temp_root(|root| {
///     assert!(telelog_core::catalog::list_packages(root).unwrap().is_empty());
/// });
/// ```
pub fn with_temp_root<F, R>(f: F) -> R
where
    F: FnOnce(&Path) -> R,
{
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    f(temp_dir.path())
}

/// `count` messages cycling through `tags`, one millisecond apart.
pub fn sample_messages(tags: &[&str], count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            let tag = tags[i % tags.len()];
            Message::new(
                tag,
                "10.0.0.1:41001",
                1_000_000 * i as Timestamp,
                format!("{tag}-{i}").into_bytes(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use telelog_core::PackageStatus;

    #[test]
    fn close_reopens_clean() {
        let package = TestPackage::with_messages(&[("event", 1, "a"), ("vision", 2, "b")]);
        let closed = package.close();
        assert_eq!(closed.get_msg_count(), 2);
        assert_eq!(closed.status(), PackageStatus::Clean);
        assert_eq!(closed.tags(), ["event".to_string(), "vision".to_string()]);
    }

    #[test]
    fn crash_reopens_partial() {
        let mut package = TestPackage::new();
        package.append("event", 5, b"x");
        assert_eq!(package.snapshot().get_msg_count(), 1);
        let crashed = package.crash();
        assert_eq!(crashed.status(), PackageStatus::Partial);
        assert_eq!(crashed.get_msg_count(), 1);
    }

    #[test]
    fn sample_messages_cycle_tags() {
        let messages = sample_messages(&["a", "b"], 5);
        let tags: Vec<_> = messages.iter().map(Message::tag).collect();
        assert_eq!(tags, ["a", "b", "a", "b", "a"]);
        assert!(messages.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));
    }
}
