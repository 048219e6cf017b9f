//! Per-channel recording counters.
//!
//! Counters are atomic and readable while the session runs. A
//! [`ChannelStats`] value is a plain point-in-time copy.

use crate::transport::Endpoint;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters of one channel.
#[derive(Debug)]
pub(crate) struct ChannelCounters {
    tag: String,
    endpoint: Endpoint,
    received: AtomicU64,
    appended: AtomicU64,
    malformed: AtomicU64,
    dropped: AtomicU64,
    errors: AtomicU64,
}

impl ChannelCounters {
    pub(crate) fn new(tag: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            tag: tag.into(),
            endpoint,
            received: AtomicU64::new(0),
            appended: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub(crate) fn tag(&self) -> &str {
        &self.tag
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_appended(&self) {
        self.appended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            tag: self.tag.clone(),
            endpoint: self.endpoint,
            received: self.received.load(Ordering::Relaxed),
            appended: self.appended.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time statistics of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStats {
    /// Channel tag.
    pub tag: String,
    /// Endpoint the channel listens on.
    pub endpoint: Endpoint,
    /// Datagrams received, malformed ones included.
    pub received: u64,
    /// Messages written to a package.
    pub appended: u64,
    /// Datagrams discarded as empty, oversize or undecodable.
    pub malformed: u64,
    /// Messages lost to a full queue, a stop or a failed session.
    pub dropped: u64,
    /// Transport and append errors.
    pub errors: u64,
}

impl ChannelStats {
    /// Messages accepted from the network but not yet appended or dropped.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.received
            .saturating_sub(self.malformed)
            .saturating_sub(self.appended)
            .saturating_sub(self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let counters = ChannelCounters::new("vision", "239.0.0.1:5000".parse().unwrap());
        for _ in 0..5 {
            counters.record_received();
        }
        counters.record_malformed();
        counters.record_appended();
        counters.record_appended();
        counters.record_dropped();
        counters.record_error();

        let stats = counters.snapshot();
        assert_eq!(stats.tag, "vision");
        assert_eq!(stats.received, 5);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.appended, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.in_flight(), 1);
    }
}
