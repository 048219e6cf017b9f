//! In-memory transport for recorder tests without sockets.
//!
//! Each endpoint gets a crossbeam channel. Tests push datagrams through a
//! [`DatagramSender`]; the session's receiver reads them through the
//! [`Transport`] trait exactly as it would read a socket.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use telelog_core::{Datagram, Endpoint, Transport, TransportFactory};

enum Incoming {
    Datagram(Datagram),
    Invalid,
}

type Key = (IpAddr, u16);

/// Transport factory backed by in-memory channels.
#[derive(Default)]
pub struct ChannelTransportFactory {
    channels: Mutex<HashMap<Key, (Sender<Incoming>, Receiver<Incoming>)>>,
    refused: Mutex<HashSet<Key>>,
}

impl ChannelTransportFactory {
    /// Creates a factory with no endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a sender feeding `endpoint`.
    pub fn sender(&self, endpoint: &Endpoint) -> DatagramSender {
        DatagramSender {
            tx: self.channel(endpoint).0,
        }
    }

    /// Makes `open` fail for `endpoint` with `AddrInUse`.
    pub fn refuse(&self, endpoint: &Endpoint) {
        self.refused.lock().insert(endpoint.key());
    }

    fn channel(&self, endpoint: &Endpoint) -> (Sender<Incoming>, Receiver<Incoming>) {
        self.channels
            .lock()
            .entry(endpoint.key())
            .or_insert_with(crossbeam_channel::unbounded)
            .clone()
    }
}

impl TransportFactory for ChannelTransportFactory {
    fn open(&self, endpoint: &Endpoint) -> io::Result<Box<dyn Transport>> {
        if self.refused.lock().contains(&endpoint.key()) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{endpoint} refused"),
            ));
        }
        Ok(Box::new(ChannelTransport {
            rx: self.channel(endpoint).1,
        }))
    }
}

/// Feeds datagrams to one endpoint.
#[derive(Clone)]
pub struct DatagramSender {
    tx: Sender<Incoming>,
}

impl DatagramSender {
    /// Sends a datagram from `source`.
    pub fn send(&self, payload: impl Into<Vec<u8>>, source: &str) {
        let datagram = Datagram {
            payload: payload.into(),
            source: source.to_string(),
        };
        let _ = self.tx.send(Incoming::Datagram(datagram));
    }

    /// Makes the receiving transport report an undecodable datagram.
    pub fn send_invalid(&self) {
        let _ = self.tx.send(Incoming::Invalid);
    }
}

struct ChannelTransport {
    rx: Receiver<Incoming>,
}

impl Transport for ChannelTransport {
    fn receive(&mut self, timeout: Duration) -> io::Result<Option<Datagram>> {
        match self.rx.recv_timeout(timeout) {
            Ok(Incoming::Datagram(datagram)) => Ok(Some(datagram)),
            Ok(Incoming::Invalid) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "undecodable datagram",
            )),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}
