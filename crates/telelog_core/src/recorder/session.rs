//! The recording session.

use super::receiver::{ChannelReceiver, Queued};
use super::stats::{ChannelCounters, ChannelStats};
use crate::config::{RecorderConfig, WriterConfig};
use crate::error::{CoreError, CoreResult};
use crate::message::Message;
use crate::reader::PackageReader;
use crate::transport::{Endpoint, TransportFactory, UdpTransportFactory};
use crate::writer::PackageWriter;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Channels to record: tag → endpoint.
pub type ChannelMap = BTreeMap<String, Endpoint>;

/// Outcome of [`RecorderSession::start`].
#[derive(Debug, Default)]
pub struct StartSummary {
    /// Tags whose receivers are running.
    pub started: Vec<String>,
    /// Bind errors of the channels that could not be opened.
    pub failed: Vec<CoreError>,
}

impl StartSummary {
    /// Returns true if every channel started.
    #[must_use]
    pub fn all_started(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Creates the packages a session appends to.
pub trait PackageFactory: Send + Sync {
    /// Opens a fresh, empty package under `root`.
    ///
    /// # Errors
    ///
    /// Returns the error that prevented the package from being created.
    fn create(&self, root: &Path, config: WriterConfig) -> CoreResult<PackageWriter>;
}

/// Writes packages as `Rec_*` directories under the root.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirPackageFactory;

impl PackageFactory for DirPackageFactory {
    fn create(&self, root: &Path, config: WriterConfig) -> CoreResult<PackageWriter> {
        PackageWriter::create(root, config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

/// State shared between the session handle, the appender thread and the
/// direct `record` path.
struct Shared {
    root: PathBuf,
    config: RecorderConfig,
    factory: Arc<dyn PackageFactory>,
    writer: Mutex<Option<PackageWriter>>,
    /// Signals receivers and the appender to wind down.
    stop: Arc<AtomicBool>,
    /// Set by `stop()`; appends are refused afterwards.
    closed: AtomicBool,
    failure: Mutex<Option<String>>,
    packages: Mutex<Vec<PathBuf>>,
    clamped: AtomicU64,
}

impl Shared {
    /// Appends under the writer lock. A fatal storage error terminates the
    /// session.
    fn append(&self, message: Message) -> CoreResult<u64> {
        let mut slot = self.writer.lock();
        if let Some(failure) = self.failure.lock().as_ref() {
            return Err(CoreError::session_failed(failure.clone()));
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::invalid_operation("recording session is stopped"));
        }
        let Some(writer) = slot.as_mut() else {
            return Err(CoreError::invalid_operation("no active package"));
        };

        let clamped_before = writer.clamped_count();
        match writer.append(message) {
            Ok(position) => {
                if writer.clamped_count() > clamped_before {
                    self.clamped.fetch_add(1, Ordering::Relaxed);
                }
                let full = self
                    .config
                    .max_package_size
                    .is_some_and(|max| writer.message_bytes() >= max);
                if full {
                    if let Err(e) = self.rotate_locked(&mut slot) {
                        self.fail(&mut slot, &e);
                    }
                }
                Ok(position)
            }
            Err(e) if e.is_fatal_for_session() => {
                self.fail(&mut slot, &e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Closes the active package and opens a fresh one.
    fn rotate_locked(&self, slot: &mut Option<PackageWriter>) -> CoreResult<()> {
        if let Some(old) = slot.as_mut() {
            if let Err(e) = old.close() {
                warn!(package = old.name(), error = %e, "closing rotated package failed");
            }
        }
        let writer = self.factory.create(&self.root, self.config.writer)?;
        info!(package = writer.name(), "rotated to new package");
        self.packages
            .lock()
            .extend(writer.path().map(Path::to_path_buf));
        *slot = Some(writer);
        Ok(())
    }

    /// Records the first fatal failure, signals every thread to stop and
    /// closes the package as cleanly as the writer allows.
    fn fail(&self, slot: &mut Option<PackageWriter>, err: &CoreError) {
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                error!(error = %err, "recording session failed");
                *failure = Some(err.to_string());
            }
        }
        self.stop.store(true, Ordering::Release);
        if let Some(writer) = slot.as_mut() {
            if let Err(e) = writer.close() {
                warn!(package = writer.name(), error = %e, "closing failed package");
            }
        }
    }

    fn append_queued(&self, item: Queued) {
        match self.append(item.message) {
            Ok(_) => item.counters.record_appended(),
            Err(CoreError::SessionFailed { .. }) | Err(CoreError::InvalidOperation { .. }) => {
                item.counters.record_dropped();
            }
            Err(e) => {
                item.counters.record_error();
                debug!(channel = item.counters.tag(), error = %e, "append failed");
            }
        }
    }

    /// Appender thread: drains the queue until every receiver is gone, or
    /// until `drain_timeout` after the stop signal. Past that deadline the
    /// rest is discarded and counted, still until every receiver is gone.
    fn run_appender(&self, queue: &Receiver<Queued>) {
        let mut deadline: Option<Instant> = None;
        loop {
            if deadline.is_none() && self.stop.load(Ordering::Acquire) {
                deadline = Some(Instant::now() + self.config.drain_timeout);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            match queue.recv_timeout(self.config.poll_interval) {
                Ok(item) => self.append_queued(item),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        // receivers exit within one poll once stopped
        let mut leftovers = 0u64;
        for item in queue.iter() {
            item.counters.record_dropped();
            leftovers += 1;
        }
        if leftovers > 0 {
            warn!(leftovers, "drain timeout elapsed, queued messages dropped");
        }
    }
}

#[derive(Default)]
struct Workers {
    receivers: Vec<JoinHandle<()>>,
    appender: Option<JoinHandle<()>>,
}

/// Records tagged channels into rotating log packages.
///
/// All appends, from channel receivers and from [`RecorderSession::record`],
/// are serialized through one writer lock. The session owns its threads and
/// shuts them down in [`RecorderSession::stop`] (or on drop).
///
/// # Example
///
/// ```rust,ignore
/// use telelog_core::{ChannelMap, RecorderConfig, RecorderSession};
///
/// let session = RecorderSession::create("logs", RecorderConfig::default())?;
/// let mut channels = ChannelMap::new();
/// channels.insert("vision".into(), "233.233.233.233:41001".parse()?);
/// let summary = session.start(&channels)?;
/// session.record(b"operator note".to_vec(), "event", "console")?;
/// session.stop()?;
/// ```
pub struct RecorderSession {
    shared: Arc<Shared>,
    transports: Arc<dyn TransportFactory>,
    phase: Mutex<Phase>,
    workers: Mutex<Workers>,
    channels: Mutex<Vec<Arc<ChannelCounters>>>,
}

impl RecorderSession {
    /// Creates the root directory and the first package, listening on UDP.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for an invalid config, or an I/O or
    /// storage error if the package cannot be created.
    pub fn create(root: impl AsRef<Path>, config: RecorderConfig) -> CoreResult<Self> {
        let factory = Arc::new(UdpTransportFactory::new(config.max_datagram_size));
        Self::with_transport_factory(root, config, factory)
    }

    /// Same as [`RecorderSession::create`] with a custom transport factory.
    ///
    /// # Errors
    ///
    /// See [`RecorderSession::create`].
    pub fn with_transport_factory(
        root: impl AsRef<Path>,
        config: RecorderConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> CoreResult<Self> {
        Self::with_factories(root, config, factory, Arc::new(DirPackageFactory))
    }

    /// Creates a session with custom transport and package factories.
    ///
    /// # Errors
    ///
    /// See [`RecorderSession::create`].
    pub fn with_factories(
        root: impl AsRef<Path>,
        config: RecorderConfig,
        transports: Arc<dyn TransportFactory>,
        packages: Arc<dyn PackageFactory>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let writer = packages.create(&root, config.writer)?;
        info!(
            root = %root.display(),
            package = writer.name(),
            "recording session created"
        );
        let written: Vec<PathBuf> = writer.path().map(Path::to_path_buf).into_iter().collect();

        Ok(Self {
            shared: Arc::new(Shared {
                root,
                config,
                factory: packages,
                writer: Mutex::new(Some(writer)),
                stop: Arc::new(AtomicBool::new(false)),
                closed: AtomicBool::new(false),
                failure: Mutex::new(None),
                packages: Mutex::new(written),
                clamped: AtomicU64::new(0),
            }),
            transports,
            phase: Mutex::new(Phase::Idle),
            workers: Mutex::new(Workers::default()),
            channels: Mutex::new(Vec::new()),
        })
    }

    /// Opens every channel and starts its receiver.
    ///
    /// Channels that fail to bind are reported in the summary while the
    /// others keep recording.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the map is empty, a tag is empty or two tags
    ///   share an endpoint (nothing is started)
    /// - the first `Bind` error if no channel could be opened
    /// - `InvalidOperation` if the session was already started or stopped
    pub fn start(&self, channels: &ChannelMap) -> CoreResult<StartSummary> {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Idle => {}
            Phase::Running => return Err(CoreError::invalid_operation("session already started")),
            Phase::Stopped => return Err(CoreError::invalid_operation("session is stopped")),
        }
        if let Some(failure) = self.failure() {
            return Err(CoreError::session_failed(failure));
        }
        validate_channels(channels)?;

        let mut summary = StartSummary::default();
        let mut opened = Vec::new();
        for (tag, endpoint) in channels {
            match self.transports.open(endpoint) {
                Ok(transport) => {
                    opened.push((tag.clone(), *endpoint, transport));
                    summary.started.push(tag.clone());
                }
                Err(e) => {
                    let err = CoreError::bind(tag.clone(), endpoint, e);
                    warn!(channel = %tag, endpoint = %endpoint, error = %err, "channel bind failed");
                    summary.failed.push(err);
                }
            }
        }
        if opened.is_empty() {
            return Err(summary
                .failed
                .into_iter()
                .next()
                .unwrap_or_else(|| CoreError::configuration("no channels to record")));
        }

        let config = &self.shared.config;
        let (sender, queue) = crossbeam_channel::bounded::<Queued>(config.queue_capacity);
        let mut workers = self.workers.lock();

        let shared = Arc::clone(&self.shared);
        workers.appender = Some(
            thread::Builder::new()
                .name("telelog-appender".into())
                .spawn(move || shared.run_appender(&queue))?,
        );

        let mut counters_list = self.channels.lock();
        for (tag, endpoint, transport) in opened {
            let counters = Arc::new(ChannelCounters::new(tag.clone(), endpoint));
            counters_list.push(Arc::clone(&counters));
            let receiver = ChannelReceiver {
                transport,
                queue: sender.clone(),
                counters,
                stop: Arc::clone(&self.shared.stop),
                poll_interval: config.poll_interval,
                max_datagram_size: config.max_datagram_size,
                backpressure: config.backpressure,
            };
            let spawned = thread::Builder::new()
                .name(format!("telelog-rx-{tag}"))
                .spawn(move || receiver.run());
            match spawned {
                Ok(handle) => workers.receivers.push(handle),
                Err(e) => {
                    self.shared.stop.store(true, Ordering::Release);
                    drop(sender);
                    join_all(std::mem::take(&mut *workers));
                    *phase = Phase::Stopped;
                    return Err(e.into());
                }
            }
        }

        *phase = Phase::Running;
        info!(
            channels = summary.started.len(),
            failed = summary.failed.len(),
            "recording started"
        );
        Ok(summary)
    }

    /// Appends a payload stamped with the current time.
    ///
    /// The timestamp is taken before waiting for the writer lock.
    ///
    /// # Errors
    ///
    /// Returns the storage error that failed the append (the session is
    /// then failed), `SessionFailed` on a failed session, or
    /// `InvalidOperation` after `stop()`.
    pub fn record(
        &self,
        payload: impl Into<Vec<u8>>,
        tag: &str,
        source: &str,
    ) -> CoreResult<u64> {
        self.record_message(Message::now(tag, source, payload))
    }

    /// Appends a message with a caller-supplied timestamp.
    ///
    /// # Errors
    ///
    /// Same as [`RecorderSession::record`].
    pub fn record_message(&self, message: Message) -> CoreResult<u64> {
        self.shared.append(message)
    }

    /// Closes the active package and continues in a new one.
    ///
    /// # Errors
    ///
    /// Returns an error if the new package cannot be created; the session
    /// is failed in that case.
    pub fn rotate(&self) -> CoreResult<()> {
        let mut slot = self.shared.writer.lock();
        if let Some(failure) = self.shared.failure.lock().as_ref() {
            return Err(CoreError::session_failed(failure.clone()));
        }
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(CoreError::invalid_operation("recording session is stopped"));
        }
        self.shared.rotate_locked(&mut slot).inspect_err(|e| {
            self.shared.fail(&mut slot, e);
        })
    }

    /// Stops receivers, drains the queue and closes the active package.
    ///
    /// Calling `stop` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SessionFailed` if the session failed while recording, or
    /// the error from closing the package.
    pub fn stop(&self) -> CoreResult<()> {
        let mut phase = self.phase.lock();
        if *phase == Phase::Stopped {
            return Ok(());
        }
        *phase = Phase::Stopped;

        self.shared.stop.store(true, Ordering::Release);
        join_all(std::mem::take(&mut *self.workers.lock()));

        let closed = {
            let mut slot = self.shared.writer.lock();
            self.shared.closed.store(true, Ordering::Release);
            slot.as_mut().map_or(Ok(()), PackageWriter::close)
        };

        let stats = self.channel_stats();
        info!(
            packages = self.shared.packages.lock().len(),
            appended = stats.iter().map(|s| s.appended).sum::<u64>(),
            dropped = stats.iter().map(|s| s.dropped).sum::<u64>(),
            "recording stopped"
        );

        match self.failure() {
            Some(failure) => Err(CoreError::session_failed(failure)),
            None => closed,
        }
    }

    /// Reader over everything appended to the active package so far.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the package cannot be reopened.
    pub fn snapshot(&self) -> CoreResult<PackageReader> {
        let mut slot = self.shared.writer.lock();
        let writer = slot
            .as_mut()
            .ok_or_else(|| CoreError::invalid_operation("no active package"))?;
        writer.snapshot()
    }

    /// The recording root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Name of the package currently written.
    #[must_use]
    pub fn current_package(&self) -> Option<String> {
        self.shared
            .writer
            .lock()
            .as_ref()
            .map(|w| w.name().to_string())
    }

    /// Directories of every package this session wrote, oldest first.
    #[must_use]
    pub fn packages(&self) -> Vec<PathBuf> {
        self.shared.packages.lock().clone()
    }

    /// The failure that terminated the session, if any.
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        self.shared.failure.lock().clone()
    }

    /// Returns true while channel receivers run.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.phase.lock() == Phase::Running && !self.shared.stop.load(Ordering::Acquire)
    }

    /// Per-channel statistics, in start order.
    #[must_use]
    pub fn channel_stats(&self) -> Vec<ChannelStats> {
        self.channels
            .lock()
            .iter()
            .map(|c| c.snapshot())
            .collect()
    }

    /// Messages whose timestamp was raised to keep packages ordered.
    #[must_use]
    pub fn clamped(&self) -> u64 {
        self.shared.clamped.load(Ordering::Relaxed)
    }
}

impl Drop for RecorderSession {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "recording session stopped with error");
        }
    }
}

impl std::fmt::Debug for RecorderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderSession")
            .field("root", &self.shared.root)
            .field("phase", &*self.phase.lock())
            .field("failure", &self.failure())
            .finish_non_exhaustive()
    }
}

fn validate_channels(channels: &ChannelMap) -> CoreResult<()> {
    if channels.is_empty() {
        return Err(CoreError::configuration("no channels to record"));
    }
    // every socket binds its port on the interface, whatever the group
    let mut ports = HashMap::new();
    for (tag, endpoint) in channels {
        if tag.is_empty() {
            return Err(CoreError::configuration("channel tag must not be empty"));
        }
        if endpoint.port == 0 {
            continue;
        }
        if let Some(other) = ports.insert(endpoint.port, tag) {
            return Err(CoreError::configuration(format!(
                "channels '{other}' and '{tag}' share port {}",
                endpoint.port
            )));
        }
    }
    Ok(())
}

/// Joins receivers first so the appender sees the queue disconnect.
fn join_all(workers: Workers) {
    for handle in workers.receivers {
        if handle.join().is_err() {
            error!("channel receiver panicked");
        }
    }
    if let Some(handle) = workers.appender {
        if handle.join().is_err() {
            error!("appender panicked");
        }
    }
}
