//! Package directory management.
//!
//! Every package lives in its own directory under the recording root:
//!
//! ```text
//! <root>/
//! ├─ Rec_2026-10-18_09-30-12-104233/
//! │  ├─ messages.tlm
//! │  └─ index.tlx
//! └─ Rec_2026-10-18_09-41-55-000817/
//! ```
//!
//! Names carry the local creation time down to the microsecond. Two packages
//! created within the same microsecond get a numeric suffix.

use crate::error::{CoreError, CoreResult};
use crate::format::{INDEX_FILE, MESSAGES_FILE};
use crate::message::Timestamp;
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Prefix of every package directory name.
pub const PACKAGE_PREFIX: &str = "Rec_";

/// Attempts at finding a free name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Formats the directory name of a package created at `created`.
#[must_use]
pub fn package_name(created: &DateTime<Local>) -> String {
    created.format("Rec_%Y-%m-%d_%H-%M-%S-%6f").to_string()
}

/// A package directory on disk.
#[derive(Debug, Clone)]
pub struct PackageDir {
    path: PathBuf,
    name: String,
    created_at: Timestamp,
}

impl PackageDir {
    /// Creates a new, uniquely named package directory under `root`.
    ///
    /// The root is created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(root: &Path) -> CoreResult<Self> {
        Self::create_at(root, Local::now())
    }

    /// Creates a package directory named after an explicit creation time.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or every
    /// candidate name is taken.
    pub fn create_at(root: &Path, created: DateTime<Local>) -> CoreResult<Self> {
        fs::create_dir_all(root)?;

        let base = package_name(&created);
        let created_at = created.timestamp_nanos_opt().unwrap_or(0);

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}_{attempt}")
            };
            let path = root.join(&name);
            match fs::create_dir(&path) {
                Ok(()) => {
                    sync_directory(root)?;
                    return Ok(Self {
                        path,
                        name,
                        created_at,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(CoreError::invalid_operation(format!(
            "no free package name for {base} under {}",
            root.display()
        )))
    }

    /// Refers to an existing package directory.
    ///
    /// The creation time is unknown until the index header is read, so it is
    /// reported as 0 here.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `path` is not a directory.
    pub fn open(path: &Path) -> CoreResult<Self> {
        if !path.is_dir() {
            return Err(CoreError::not_found(path));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            created_at: 0,
        })
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creation time in nanoseconds since the Unix epoch.
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Path of the message block file.
    #[must_use]
    pub fn messages_path(&self) -> PathBuf {
        self.path.join(MESSAGES_FILE)
    }

    /// Path of the index file.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.path.join(INDEX_FILE)
    }

    /// Total size in bytes of both package files.
    ///
    /// Missing files count as empty.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        [self.messages_path(), self.index_path()]
            .iter()
            .filter_map(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .sum()
    }

    /// Syncs the package directory so newly created files are durable.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be synced.
    pub fn sync(&self) -> CoreResult<()> {
        sync_directory(&self.path)
    }
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> CoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> CoreResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn fixed_time() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 10, 18, 9, 30, 12)
            .unwrap()
            .checked_add_signed(chrono::Duration::microseconds(104))
            .unwrap()
    }

    #[test]
    fn name_has_microsecond_precision() {
        assert_eq!(package_name(&fixed_time()), "Rec_2026-10-18_09-30-12-000104");
    }

    #[test]
    fn create_makes_root_and_directory() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("logs");

        let dir = PackageDir::create(&root).unwrap();
        assert!(dir.path().is_dir());
        assert!(dir.name().starts_with(PACKAGE_PREFIX));
        assert!(dir.created_at() > 0);
        assert_eq!(dir.index_path(), dir.path().join("index.tlx"));
        assert_eq!(dir.messages_path(), dir.path().join("messages.tlm"));
    }

    #[test]
    fn same_time_gets_suffix() {
        let temp = tempdir().unwrap();
        let first = PackageDir::create_at(temp.path(), fixed_time()).unwrap();
        let second = PackageDir::create_at(temp.path(), fixed_time()).unwrap();
        assert_ne!(first.name(), second.name());
        assert_eq!(second.name(), format!("{}_1", first.name()));
    }

    #[test]
    fn open_missing_is_not_found() {
        let temp = tempdir().unwrap();
        let result = PackageDir::open(&temp.path().join("Rec_missing"));
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn size_counts_both_files() {
        let temp = tempdir().unwrap();
        let dir = PackageDir::create(temp.path()).unwrap();
        assert_eq!(dir.size_bytes(), 0);
        fs::write(dir.messages_path(), [0u8; 10]).unwrap();
        fs::write(dir.index_path(), [0u8; 5]).unwrap();
        assert_eq!(dir.size_bytes(), 15);
    }
}
