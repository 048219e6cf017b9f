//! Datagram transports feeding channel receivers.
//!
//! The recorder only sees the [`Transport`] and [`TransportFactory`] traits.
//! [`UdpTransportFactory`] binds real sockets and joins multicast groups;
//! tests plug in an in-memory factory instead.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::str::FromStr;
use std::time::Duration;

/// Minimum socket read timeout; a zero timeout means "block forever" to the OS.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// One received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Raw payload.
    pub payload: Vec<u8>,
    /// Sender address, e.g. `10.1.1.7:41001`.
    pub source: String,
}

/// A source of datagrams for one channel.
pub trait Transport: Send {
    /// Waits up to `timeout` for the next datagram.
    ///
    /// Returns `Ok(None)` when the timeout elapses. An `InvalidData` error
    /// marks a malformed datagram that was discarded.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn receive(&mut self, timeout: Duration) -> io::Result<Option<Datagram>>;
}

/// Opens transports for endpoints.
pub trait TransportFactory: Send + Sync {
    /// Binds a transport to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns the bind or group-join error.
    fn open(&self, endpoint: &Endpoint) -> io::Result<Box<dyn Transport>>;
}

/// Where a channel listens: a multicast group (or unicast address) and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Multicast group, or the local address for unicast channels.
    pub group: IpAddr,
    /// UDP port.
    pub port: u16,
    /// Local interface to bind and join on; all interfaces when `None`.
    pub bind_ip: Option<IpAddr>,
}

impl Endpoint {
    /// Creates an endpoint listening on all interfaces.
    #[must_use]
    pub const fn new(group: IpAddr, port: u16) -> Self {
        Self {
            group,
            port,
            bind_ip: None,
        }
    }

    /// Sets the local interface.
    #[must_use]
    pub const fn with_bind_ip(mut self, bind_ip: IpAddr) -> Self {
        self.bind_ip = Some(bind_ip);
        self
    }

    /// Returns true if `group` is a multicast address.
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.group.is_multicast()
    }

    /// `group:port` pair identifying the endpoint regardless of interface.
    #[must_use]
    pub fn key(&self) -> (IpAddr, u16) {
        (self.group, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        SocketAddr::new(self.group, self.port).fmt(f)
    }
}

impl FromStr for Endpoint {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: SocketAddr = s.parse()?;
        Ok(Self::new(addr.ip(), addr.port()))
    }
}

/// Opens [`UdpTransport`]s.
#[derive(Debug, Clone, Copy)]
pub struct UdpTransportFactory {
    max_datagram_size: usize,
}

impl UdpTransportFactory {
    /// Creates a factory whose transports accept datagrams up to
    /// `max_datagram_size` bytes.
    #[must_use]
    pub const fn new(max_datagram_size: usize) -> Self {
        Self { max_datagram_size }
    }
}

impl TransportFactory for UdpTransportFactory {
    fn open(&self, endpoint: &Endpoint) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(UdpTransport::bind(endpoint, self.max_datagram_size)?))
    }
}

/// UDP socket transport, joined to a multicast group when the endpoint is
/// one.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    buf: Vec<u8>,
    max_datagram_size: usize,
    timeout: Option<Duration>,
}

impl UdpTransport {
    /// Binds to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns the bind or join error.
    pub fn bind(endpoint: &Endpoint, max_datagram_size: usize) -> io::Result<Self> {
        let socket = if endpoint.is_multicast() {
            let local = endpoint.bind_ip.unwrap_or(match endpoint.group {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            });
            let socket = UdpSocket::bind(SocketAddr::new(local, endpoint.port))?;
            match (endpoint.group, local) {
                (IpAddr::V4(group), IpAddr::V4(iface)) => {
                    socket.join_multicast_v4(&group, &iface)?;
                }
                (IpAddr::V6(group), _) => socket.join_multicast_v6(&group, 0)?,
                (IpAddr::V4(_), IpAddr::V6(_)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "IPv4 group on an IPv6 interface",
                    ))
                }
            }
            socket
        } else {
            UdpSocket::bind(SocketAddr::new(endpoint.group, endpoint.port))?
        };

        Ok(Self {
            socket,
            // one spare byte so oversize datagrams are detectable
            buf: vec![0u8; max_datagram_size.saturating_add(1)],
            max_datagram_size,
            timeout: None,
        })
    }

    /// Local address of the socket.
    ///
    /// # Errors
    ///
    /// Returns the socket error.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    fn receive(&mut self, timeout: Duration) -> io::Result<Option<Datagram>> {
        let timeout = timeout.max(MIN_READ_TIMEOUT);
        if self.timeout != Some(timeout) {
            self.socket.set_read_timeout(Some(timeout))?;
            self.timeout = Some(timeout);
        }

        match self.socket.recv_from(&mut self.buf) {
            Ok((len, _)) if len > self.max_datagram_size => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("datagram exceeds {} bytes", self.max_datagram_size),
            )),
            Ok((len, peer)) => Ok(Some(Datagram {
                payload: self.buf[..len].to_vec(),
                source: peer.to_string(),
            })),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
