//! Package catalog: discovery of the packages under a recording root.

use crate::error::{CoreError, CoreResult};
use crate::format::{IndexRecord, IndexRecordIterator, FOOTER_RECORD_SIZE, INDEX_FILE};
use crate::message::Timestamp;
use crate::reader::{PackageReader, PackageStatus};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use telelog_storage::{FileBackend, StorageBackend};
use tracing::debug;

/// A package found under a recording root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    /// Directory name.
    pub name: String,
    /// Directory path.
    pub path: PathBuf,
    /// Creation time from the index header.
    pub created_at: Timestamp,
    /// Clean or partial.
    pub status: PackageStatus,
    /// Combined size of the package files.
    pub size_bytes: u64,
    /// Message count from the footer; unknown for partial packages.
    pub message_count: Option<u64>,
}

/// Lists every package under `root`, most recent first.
///
/// A directory counts as a package when its index starts with a valid
/// header. Anything else is skipped. A missing root yields an empty list.
///
/// # Errors
///
/// Returns an I/O error if `root` exists but cannot be read.
pub fn list_packages(root: &Path) -> CoreResult<Vec<PackageEntry>> {
    let dir = match fs::read_dir(root) {
        Ok(dir) => dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    for item in dir {
        let path = item?.path();
        if !path.is_dir() {
            continue;
        }
        match inspect(&path) {
            Ok(entry) => entries.push(entry),
            Err(e) => debug!(path = %path.display(), error = %e, "skipping catalog entry"),
        }
    }

    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.name.cmp(&a.name))
    });
    Ok(entries)
}

/// Reads the header and footer of one package without loading its index.
fn inspect(path: &Path) -> CoreResult<PackageEntry> {
    let index_file = FileBackend::open_read_only(&path.join(INDEX_FILE))?;

    let created_at = match IndexRecordIterator::new(&index_file, 0)?.next() {
        Some(Ok((_, IndexRecord::Header { created_at, .. }))) => created_at,
        Some(Err(e)) => return Err(e),
        _ => {
            return Err(CoreError::invalid_format(
                "index does not start with a header",
            ))
        }
    };

    let size = index_file.size()?;
    let footer = if size >= FOOTER_RECORD_SIZE as u64 {
        let bytes = index_file.read_at(size - FOOTER_RECORD_SIZE as u64, FOOTER_RECORD_SIZE)?;
        match IndexRecord::decode(&bytes) {
            Ok(IndexRecord::Footer { message_count, .. }) => Some(message_count),
            _ => None,
        }
    } else {
        None
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let size_bytes = fs::read_dir(path)?
        .filter_map(Result::ok)
        .filter_map(|e| e.metadata().ok())
        .filter(fs::Metadata::is_file)
        .map(|m| m.len())
        .sum();

    Ok(PackageEntry {
        name,
        path: path.to_path_buf(),
        created_at,
        status: if footer.is_some() {
            PackageStatus::Clean
        } else {
            PackageStatus::Partial
        },
        size_bytes,
        message_count: footer,
    })
}

/// Opens the most recent cleanly closed package under `root`.
///
/// # Errors
///
/// Returns an error if the root cannot be listed or the chosen package
/// cannot be opened.
pub fn open_latest(root: &Path) -> CoreResult<Option<PackageReader>> {
    list_packages(root)?
        .into_iter()
        .find(|e| e.status == PackageStatus::Clean)
        .map(|e| PackageReader::open(&e.path))
        .transpose()
}

/// Opens the package called `name` under `root`, or `None` if it does not
/// exist.
///
/// # Errors
///
/// Returns an error if the package exists but cannot be opened.
pub fn open(root: &Path, name: &str) -> CoreResult<Option<PackageReader>> {
    let path = root.join(name);
    if !path.is_dir() {
        return Ok(None);
    }
    PackageReader::open(&path).map(Some)
}
