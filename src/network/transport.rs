//! Transport seam
//!
//! The sink only needs a small surface from its delivery engine: start the
//! engine, listen on an address, accept without blocking, and send without
//! blocking. Anything that implements these traits can carry the stream.

use std::fmt;
use std::net::{SocketAddr, SocketAddrV4};

use crate::config::LatencyProfile;
use crate::constants::LIVE_LATENCY_MS;
use crate::error::TransportError;

/// Outcome of a send that did not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Send buffer is full right now
    WouldBlock,
    /// Connection is unusable (peer gone, reset, ...)
    Fatal(String),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::WouldBlock => write!(f, "send would block"),
            SendError::Fatal(reason) => write!(f, "send failed: {}", reason),
        }
    }
}

impl std::error::Error for SendError {}

/// Socket options derived from a latency profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    /// Never block on send or receive
    pub nonblocking: bool,
    /// Deliver packets according to their sender timestamps
    pub timestamp_delivery: bool,
    /// Drop packets that arrive too late to play
    pub drop_late_packets: bool,
    /// Periodic negative-acknowledgement reports
    pub nak_report: bool,
    /// Latency budget in milliseconds
    pub latency_ms: u32,
}

impl TransportOptions {
    /// Options shared by the listener and every accepted client
    pub fn for_profile(profile: LatencyProfile) -> Self {
        match profile {
            LatencyProfile::Live => Self {
                nonblocking: true,
                timestamp_delivery: true,
                drop_late_packets: true,
                nak_report: true,
                latency_ms: LIVE_LATENCY_MS,
            },
            LatencyProfile::LowLatency => Self {
                nonblocking: true,
                timestamp_delivery: false,
                drop_late_packets: false,
                nak_report: false,
                latency_ms: 0,
            },
        }
    }
}

/// A connected client
///
/// The connection is closed when the value is dropped.
pub trait Connection {
    /// Send without blocking, returning bytes accepted
    fn send(&mut self, buf: &[u8]) -> Result<usize, SendError>;

    /// Apply socket options
    fn configure(&mut self, options: &TransportOptions) -> Result<(), TransportError>;

    /// Remote address, if known
    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// A bound, listening endpoint
///
/// The endpoint is closed when the value is dropped.
pub trait Listener {
    type Conn: Connection;

    /// Accept one pending connection
    ///
    /// `Ok(None)` means nothing is pending.
    fn accept(&mut self) -> Result<Option<Self::Conn>, TransportError>;

    /// Largest payload one send may carry, if the engine reports one
    fn payload_size(&self) -> Option<usize>;

    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Delivery engine factory
pub trait Transport {
    type Listener: Listener;

    /// Start the engine; must be idempotent
    fn startup(&self) -> Result<(), TransportError>;

    /// Create a configured listener bound to `addr`
    fn listen(
        &self,
        addr: SocketAddrV4,
        options: &TransportOptions,
        backlog: i32,
    ) -> Result<Self::Listener, TransportError>;
}
