//! Channel receiver loop.
//!
//! One receiver runs per channel on its own thread. It waits on its
//! transport, wraps every datagram into a [`Message`] outside any lock and
//! hands it to the appender queue.

use super::stats::ChannelCounters;
use crate::config::BackpressurePolicy;
use crate::message::Message;
use crate::transport::{Datagram, Transport};
use crossbeam_channel::{SendTimeoutError, Sender, TrySendError};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A message waiting for the appender, with the counters of its channel.
pub(crate) struct Queued {
    pub(crate) message: Message,
    pub(crate) counters: Arc<ChannelCounters>,
}

pub(crate) struct ChannelReceiver {
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) queue: Sender<Queued>,
    pub(crate) counters: Arc<ChannelCounters>,
    pub(crate) stop: Arc<AtomicBool>,
    pub(crate) poll_interval: Duration,
    pub(crate) max_datagram_size: usize,
    pub(crate) backpressure: BackpressurePolicy,
}

impl ChannelReceiver {
    /// Receives until the stop flag is set or the appender goes away.
    pub(crate) fn run(mut self) {
        let tag = self.counters.tag().to_string();
        debug!(channel = %tag, "receiver started");

        while !self.stop.load(Ordering::Acquire) {
            match self.transport.receive(self.poll_interval) {
                Ok(None) => {}
                Ok(Some(datagram)) => {
                    self.counters.record_received();
                    let Some(message) = self.wrap(&tag, datagram) else {
                        continue;
                    };
                    if !self.forward(message) {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    self.counters.record_received();
                    self.counters.record_malformed();
                    debug!(channel = %tag, error = %e, "malformed datagram dropped");
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.counters.record_error();
                    warn!(channel = %tag, error = %e, "transport receive failed");
                    std::thread::sleep(self.poll_interval);
                }
            }
        }

        debug!(channel = %tag, "receiver stopped");
    }

    /// Turns a datagram into a message stamped with the receipt time.
    fn wrap(&self, tag: &str, datagram: Datagram) -> Option<Message> {
        let len = datagram.payload.len();
        if len == 0 || len > self.max_datagram_size {
            self.counters.record_malformed();
            debug!(channel = %tag, len, "malformed datagram dropped");
            return None;
        }
        Some(Message::now(tag, datagram.source, datagram.payload))
    }

    /// Queues a message. Returns false once the appender is gone.
    fn forward(&self, message: Message) -> bool {
        let mut item = Queued {
            message,
            counters: Arc::clone(&self.counters),
        };

        match self.backpressure {
            BackpressurePolicy::DropNewest => match self.queue.try_send(item) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.counters.record_dropped();
                    true
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.counters.record_dropped();
                    false
                }
            },
            BackpressurePolicy::Block => loop {
                match self.queue.send_timeout(item, self.poll_interval) {
                    Ok(()) => return true,
                    // held until the appender takes it or goes away
                    Err(SendTimeoutError::Timeout(back)) => item = back,
                    Err(SendTimeoutError::Disconnected(_)) => {
                        self.counters.record_dropped();
                        return false;
                    }
                }
            },
        }
    }
}
