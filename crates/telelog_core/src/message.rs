//! The message data unit.

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch.
pub type Timestamp = i64;

/// Returns the current wall-clock time in nanoseconds since the Unix epoch.
///
/// Clocks set before 1970 yield negative values; clocks beyond the `i64`
/// range saturate.
#[must_use]
pub fn now_nanos() -> Timestamp {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_nanos())
            .map(|n| -n)
            .unwrap_or(i64::MIN),
    }
}

/// An immutable, tagged, time-stamped message.
///
/// The payload is opaque; telelog never interprets it. `timestamp` orders
/// the message within its package; `received_at` is the producer's capture
/// time. They differ only when a package clamped a late message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    tag: String,
    source: String,
    timestamp: Timestamp,
    received_at: Timestamp,
    payload: Vec<u8>,
}

impl Message {
    /// Creates a message with an explicit timestamp.
    pub fn new(
        tag: impl Into<String>,
        source: impl Into<String>,
        timestamp: Timestamp,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            tag: tag.into(),
            source: source.into(),
            timestamp,
            received_at: timestamp,
            payload: payload.into(),
        }
    }

    /// Creates a message stamped with the current time.
    pub fn now(
        tag: impl Into<String>,
        source: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(tag, source, now_nanos(), payload)
    }

    /// The channel tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Where the message came from (peer address, or caller-supplied).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Ordering timestamp in nanoseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Capture time as stamped by the producer.
    #[must_use]
    pub fn received_at(&self) -> Timestamp {
        self.received_at
    }

    /// Returns true if the ordering timestamp was raised above the capture
    /// time.
    #[must_use]
    pub fn is_clamped(&self) -> bool {
        self.timestamp != self.received_at
    }

    /// The opaque payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the message and returns the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Returns the same message ordered at `timestamp`, keeping its capture
    /// time.
    pub(crate) fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the capture time of a decoded message.
    pub(crate) fn with_received_at(mut self, received_at: Timestamp) -> Self {
        self.received_at = received_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let msg = Message::new("vision", "10.0.0.7:5000", 42, b"frame".to_vec());
        assert_eq!(msg.tag(), "vision");
        assert_eq!(msg.source(), "10.0.0.7:5000");
        assert_eq!(msg.timestamp(), 42);
        assert_eq!(msg.received_at(), 42);
        assert!(!msg.is_clamped());
        assert_eq!(msg.payload(), b"frame");
        assert_eq!(msg.into_payload(), b"frame".to_vec());
    }

    #[test]
    fn raised_timestamp_keeps_capture_time() {
        let msg = Message::new("vision", "", 400, b"x".to_vec()).with_timestamp(500);
        assert_eq!(msg.timestamp(), 500);
        assert_eq!(msg.received_at(), 400);
        assert!(msg.is_clamped());
    }

    #[test]
    fn now_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(now_nanos() > 1_577_836_800_000_000_000);
        assert!(Message::now("event", "", b"".to_vec()).timestamp() > 0);
    }
}
