//! In-process transport
//!
//! A scripted stand-in for a network engine. Each [`MemoryPeer`] is the far
//! end of one connection: it records every chunk the sink sends and can be
//! switched to fail or stall, which makes fan-out behavior observable
//! without real sockets.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use crate::error::TransportError;
use crate::network::engine;
use crate::network::transport::{Connection, Listener, SendError, Transport, TransportOptions};

/// How a peer responds to sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Take everything
    Accept,
    /// Take up to this many more bytes, then report would-block
    StallAfter(usize),
    /// Every send fails fatally
    Disconnected,
}

#[derive(Debug)]
struct PeerState {
    behavior: PeerBehavior,
    chunks: Vec<Vec<u8>>,
    options: Option<TransportOptions>,
    closed: bool,
}

enum Pending {
    Conn(MemoryConnection),
    Error(String),
}

#[derive(Default)]
struct Hub {
    pending: VecDeque<Pending>,
    fail_startup: bool,
    fail_listen: bool,
    payload_size: Option<usize>,
    listener_open: bool,
    listener_options: Option<TransportOptions>,
    next_port: u16,
}

/// Scripted in-memory transport; clones share state
#[derive(Clone, Default)]
pub struct MemoryTransport {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `startup` fail
    pub fn fail_startup(&self, fail: bool) {
        self.hub.lock().fail_startup = fail;
    }

    /// Make the next `listen` fail at bind
    pub fn fail_listen(&self, fail: bool) {
        self.hub.lock().fail_listen = fail;
    }

    /// Payload size reported by listeners
    pub fn set_payload_size(&self, size: Option<usize>) {
        self.hub.lock().payload_size = size;
    }

    /// Queue an inbound connection and return its far end
    pub fn connect(&self) -> MemoryPeer {
        let mut hub = self.hub.lock();
        hub.next_port = hub.next_port.wrapping_add(1);
        let state = Arc::new(Mutex::new(PeerState {
            behavior: PeerBehavior::Accept,
            chunks: Vec::new(),
            options: None,
            closed: false,
        }));
        let peer = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 40000u16.wrapping_add(hub.next_port)));
        hub.pending.push_back(Pending::Conn(MemoryConnection {
            state: state.clone(),
            peer,
        }));
        MemoryPeer { state }
    }

    /// Queue an accept failure
    pub fn inject_accept_error(&self, reason: &str) {
        self.hub
            .lock()
            .pending
            .push_back(Pending::Error(reason.to_string()));
    }

    /// Connections still waiting to be accepted
    pub fn pending(&self) -> usize {
        self.hub.lock().pending.len()
    }

    pub fn listener_open(&self) -> bool {
        self.hub.lock().listener_open
    }

    /// Options the listener was created with
    pub fn listener_options(&self) -> Option<TransportOptions> {
        self.hub.lock().listener_options
    }
}

impl Transport for MemoryTransport {
    type Listener = MemoryListener;

    fn startup(&self) -> Result<(), TransportError> {
        if self.hub.lock().fail_startup {
            return Err(TransportError::StartupFailed("scripted failure".into()));
        }
        engine::startup()
    }

    fn listen(
        &self,
        addr: SocketAddrV4,
        options: &TransportOptions,
        _backlog: i32,
    ) -> Result<MemoryListener, TransportError> {
        let mut hub = self.hub.lock();
        if hub.fail_listen {
            return Err(TransportError::BindFailed(format!("{}: scripted failure", addr)));
        }
        hub.listener_open = true;
        hub.listener_options = Some(*options);
        Ok(MemoryListener {
            hub: self.hub.clone(),
            addr,
        })
    }
}

/// Listener end of a [`MemoryTransport`]
pub struct MemoryListener {
    hub: Arc<Mutex<Hub>>,
    addr: SocketAddrV4,
}

impl Listener for MemoryListener {
    type Conn = MemoryConnection;

    fn accept(&mut self) -> Result<Option<MemoryConnection>, TransportError> {
        match self.hub.lock().pending.pop_front() {
            Some(Pending::Conn(conn)) => Ok(Some(conn)),
            Some(Pending::Error(reason)) => Err(TransportError::AcceptFailed(reason)),
            None => Ok(None),
        }
    }

    fn payload_size(&self) -> Option<usize> {
        self.hub.lock().payload_size
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(SocketAddr::V4(self.addr))
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.hub.lock().listener_open = false;
    }
}

/// Sink end of an in-memory connection
pub struct MemoryConnection {
    state: Arc<Mutex<PeerState>>,
    peer: SocketAddr,
}

impl Connection for MemoryConnection {
    fn send(&mut self, buf: &[u8]) -> Result<usize, SendError> {
        let mut state = self.state.lock();
        match state.behavior {
            PeerBehavior::Disconnected => Err(SendError::Fatal("peer disconnected".into())),
            PeerBehavior::StallAfter(0) => Err(SendError::WouldBlock),
            PeerBehavior::StallAfter(budget) => {
                let n = buf.len().min(budget);
                state.behavior = PeerBehavior::StallAfter(budget - n);
                state.chunks.push(buf[..n].to_vec());
                Ok(n)
            }
            PeerBehavior::Accept => {
                state.chunks.push(buf.to_vec());
                Ok(buf.len())
            }
        }
    }

    fn configure(&mut self, options: &TransportOptions) -> Result<(), TransportError> {
        self.state.lock().options = Some(*options);
        Ok(())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.state.lock().closed = true;
    }
}

/// Far end of a [`MemoryConnection`]
#[derive(Clone)]
pub struct MemoryPeer {
    state: Arc<Mutex<PeerState>>,
}

impl MemoryPeer {
    pub fn set_behavior(&self, behavior: PeerBehavior) {
        self.state.lock().behavior = behavior;
    }

    /// Every chunk received, in order
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.state.lock().chunks.clone()
    }

    /// All received bytes concatenated
    pub fn received(&self) -> Vec<u8> {
        self.state.lock().chunks.concat()
    }

    pub fn clear(&self) {
        self.state.lock().chunks.clear();
    }

    /// Options the sink applied to this connection
    pub fn options(&self) -> Option<TransportOptions> {
        self.state.lock().options
    }

    /// Whether the sink has closed its end
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
