//! Writer and recorder configuration.

use crate::error::{CoreError, CoreResult};
use std::time::Duration;

/// Configuration for a single package writer.
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    /// Whether to flush both package files after every append.
    pub flush_on_append: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            flush_on_append: true,
        }
    }
}

impl WriterConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to flush after every append.
    #[must_use]
    pub const fn flush_on_append(mut self, value: bool) -> Self {
        self.flush_on_append = value;
        self
    }
}

/// What a channel receiver does when the append queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressurePolicy {
    /// Block the receiver until the appender catches up. Datagrams that
    /// arrive meanwhile queue up in the socket buffer.
    #[default]
    Block,
    /// Drop the newly received message and count it.
    DropNewest,
}

/// Configuration for a recording session.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Settings for every package the session writes.
    pub writer: WriterConfig,

    /// Capacity of the queue between channel receivers and the appender.
    pub queue_capacity: usize,

    /// Behavior when the queue is full.
    pub backpressure: BackpressurePolicy,

    /// Upper bound on draining queued messages during `stop()`.
    pub drain_timeout: Duration,

    /// Receive timeout of channel transports; bounds how long `stop()`
    /// waits for a receiver blocked on the network.
    pub poll_interval: Duration,

    /// Datagrams larger than this are dropped as malformed.
    pub max_datagram_size: usize,

    /// Rotate to a new package once the message file reaches this size.
    pub max_package_size: Option<u64>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            writer: WriterConfig::default(),
            queue_capacity: 1024,
            backpressure: BackpressurePolicy::Block,
            drain_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(50),
            max_datagram_size: 64 * 1024,
            max_package_size: None,
        }
    }
}

impl RecorderConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the package writer configuration.
    #[must_use]
    pub const fn writer(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }

    /// Sets the receiver queue capacity.
    #[must_use]
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the backpressure policy.
    #[must_use]
    pub const fn backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.backpressure = policy;
        self
    }

    /// Sets the drain timeout used by `stop()`.
    #[must_use]
    pub const fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Sets the transport poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the maximum accepted datagram size.
    #[must_use]
    pub const fn max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }

    /// Sets the package rotation threshold.
    #[must_use]
    pub const fn max_package_size(mut self, size: Option<u64>) -> Self {
        self.max_package_size = size;
        self
    }

    /// Checks the configuration before any package is created.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for zero capacities or intervals.
    pub fn validate(&self) -> CoreResult<()> {
        if self.queue_capacity == 0 {
            return Err(CoreError::configuration("queue_capacity must be > 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(CoreError::configuration("poll_interval must be > 0"));
        }
        if self.max_datagram_size == 0 {
            return Err(CoreError::configuration("max_datagram_size must be > 0"));
        }
        if self.max_package_size == Some(0) {
            return Err(CoreError::configuration("max_package_size must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RecorderConfig::default();
        assert!(config.writer.flush_on_append);
        assert_eq!(config.backpressure, BackpressurePolicy::Block);
        assert!(config.max_package_size.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = RecorderConfig::new()
            .writer(WriterConfig::new().flush_on_append(false))
            .queue_capacity(8)
            .backpressure(BackpressurePolicy::DropNewest)
            .max_package_size(Some(4096));

        assert!(!config.writer.flush_on_append);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.backpressure, BackpressurePolicy::DropNewest);
        assert_eq!(config.max_package_size, Some(4096));
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(RecorderConfig::new().queue_capacity(0).validate().is_err());
        assert!(RecorderConfig::new()
            .poll_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(RecorderConfig::new().max_datagram_size(0).validate().is_err());
        assert!(RecorderConfig::new()
            .max_package_size(Some(0))
            .validate()
            .is_err());
    }
}
