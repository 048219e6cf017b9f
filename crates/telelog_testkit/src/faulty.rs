//! Fault injection for append-path tests.
//!
//! [`FaultyBackend`] wraps any backend and fails writes once a byte budget
//! is used up, optionally leaving a torn partial write behind. The budget
//! lives in a shared [`FaultSwitch`] so a test can arm it after the
//! backend has been handed to a writer.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use telelog_testkit::faulty::{FaultSwitch, FaultyPackageFactory};
//!
//! let switch = FaultSwitch::new();
//! let packages = Arc::new(FaultyPackageFactory::new(switch.clone()));
//! let session = RecorderSession::with_factories("unused", config, transports, packages.clone())?;
//! switch.exhaust_after(0);
//! assert!(session.record(b"x".to_vec(), "event", "").is_err());
//! ```

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use telelog_core::{
    now_nanos, CoreResult, PackageFactory, PackageReader, PackageWriter, WriterConfig,
};
use telelog_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};

#[derive(Debug)]
struct SwitchState {
    budget: AtomicU64,
    written: AtomicU64,
    storage_full: AtomicBool,
    fail_truncate: AtomicBool,
    tripped: AtomicBool,
    append_delay_us: AtomicU64,
}

/// Shared trigger for one or more [`FaultyBackend`]s.
#[derive(Debug, Clone)]
pub struct FaultSwitch {
    state: Arc<SwitchState>,
}

impl Default for FaultSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultSwitch {
    /// Creates a disarmed switch.
    pub fn new() -> Self {
        Self {
            state: Arc::new(SwitchState {
                budget: AtomicU64::new(u64::MAX),
                written: AtomicU64::new(0),
                storage_full: AtomicBool::new(false),
                fail_truncate: AtomicBool::new(false),
                tripped: AtomicBool::new(false),
                append_delay_us: AtomicU64::new(0),
            }),
        }
    }

    /// Fails with a generic I/O error once `bytes` more bytes are written.
    pub fn crash_after(&self, bytes: u64) {
        self.arm(bytes, false);
    }

    /// Fails with `StorageFull` once `bytes` more bytes are written.
    pub fn exhaust_after(&self, bytes: u64) {
        self.arm(bytes, true);
    }

    /// Makes `truncate` fail, so rollbacks cannot complete.
    pub fn set_fail_truncate(&self, fail: bool) {
        self.state.fail_truncate.store(fail, Ordering::SeqCst);
    }

    /// Makes every append sleep for `delay` first, like a slow disk.
    pub fn set_append_delay(&self, delay: Duration) {
        let micros = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
        self.state.append_delay_us.store(micros, Ordering::SeqCst);
    }

    /// Disarms the switch.
    pub fn reset(&self) {
        self.state.budget.store(u64::MAX, Ordering::SeqCst);
        self.state.storage_full.store(false, Ordering::SeqCst);
        self.state.fail_truncate.store(false, Ordering::SeqCst);
        self.state.tripped.store(false, Ordering::SeqCst);
        self.state.append_delay_us.store(0, Ordering::SeqCst);
    }

    /// Returns true once a write has failed.
    pub fn tripped(&self) -> bool {
        self.state.tripped.load(Ordering::SeqCst)
    }

    fn arm(&self, bytes: u64, storage_full: bool) {
        let written = self.state.written.load(Ordering::SeqCst);
        self.state
            .budget
            .store(written.saturating_add(bytes), Ordering::SeqCst);
        self.state.storage_full.store(storage_full, Ordering::SeqCst);
    }

    fn failure(&self, what: &str) -> StorageError {
        self.state.tripped.store(true, Ordering::SeqCst);
        let kind = if self.state.storage_full.load(Ordering::SeqCst) {
            io::ErrorKind::StorageFull
        } else {
            io::ErrorKind::Other
        };
        StorageError::from(io::Error::new(kind, format!("simulated failure during {what}")))
    }
}

/// A storage backend wrapper that fails on command.
pub struct FaultyBackend {
    inner: Box<dyn StorageBackend>,
    switch: FaultSwitch,
}

impl FaultyBackend {
    /// Wraps `inner`.
    pub fn new(inner: Box<dyn StorageBackend>, switch: FaultSwitch) -> Self {
        Self { inner, switch }
    }

    /// Wraps a fresh in-memory backend and returns a handle to its bytes.
    pub fn in_memory(switch: FaultSwitch) -> (Self, InMemoryBackend) {
        let memory = InMemoryBackend::new();
        (Self::new(Box::new(memory.clone()), switch), memory)
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let state = &self.switch.state;
        let delay = state.append_delay_us.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_micros(delay));
        }
        let written = state.written.load(Ordering::SeqCst);
        let budget = state.budget.load(Ordering::SeqCst);
        let len = data.len() as u64;

        if written.saturating_add(len) > budget {
            // torn write up to the budget
            let partial = budget.saturating_sub(written) as usize;
            if partial > 0 {
                let _ = self.inner.append(&data[..partial]);
                state.written.fetch_add(partial as u64, Ordering::SeqCst);
            }
            return Err(self.switch.failure("append"));
        }

        let offset = self.inner.append(data)?;
        state.written.fetch_add(len, Ordering::SeqCst);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.switch.state.fail_truncate.load(Ordering::SeqCst) {
            return Err(self.switch.failure("truncate"));
        }
        self.inner.truncate(new_size)
    }

    fn read_handle(&self) -> StorageResult<Box<dyn StorageBackend>> {
        self.inner.read_handle()
    }
}

/// One in-memory package written through a [`FaultyPackageFactory`].
#[derive(Debug, Clone)]
pub struct MemoryPackage {
    /// Package name.
    pub name: String,
    /// Message file bytes.
    pub messages: InMemoryBackend,
    /// Index file bytes.
    pub index: InMemoryBackend,
}

impl MemoryPackage {
    /// Opens a reader over the package as it is now.
    pub fn reader(&self) -> CoreResult<PackageReader> {
        PackageReader::from_backends(Box::new(self.messages.clone()), &self.index)
    }
}

/// Creates in-memory packages whose backends share one [`FaultSwitch`].
#[derive(Debug)]
pub struct FaultyPackageFactory {
    switch: FaultSwitch,
    created: parking_lot::Mutex<Vec<MemoryPackage>>,
}

impl FaultyPackageFactory {
    /// Creates a factory driven by `switch`.
    pub fn new(switch: FaultSwitch) -> Self {
        Self {
            switch,
            created: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Every package created so far, oldest first.
    pub fn packages(&self) -> Vec<MemoryPackage> {
        self.created.lock().clone()
    }
}

impl PackageFactory for FaultyPackageFactory {
    fn create(&self, _root: &Path, config: WriterConfig) -> CoreResult<PackageWriter> {
        let mut created = self.created.lock();
        let name = format!("Rec_mem_{}", created.len());
        let (messages, messages_mem) = FaultyBackend::in_memory(self.switch.clone());
        let (index, index_mem) = FaultyBackend::in_memory(self.switch.clone());
        let writer = PackageWriter::with_backends(
            name.clone(),
            now_nanos(),
            Box::new(messages),
            Box::new(index),
            config,
        )?;
        created.push(MemoryPackage {
            name,
            messages: messages_mem,
            index: index_mem,
        });
        Ok(writer)
    }
}
