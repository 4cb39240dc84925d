//! Non-blocking stream-socket transport
//!
//! Carries the sink over plain TCP using `socket2`. The latency profile is
//! mapped onto what a stream socket can express: every socket is
//! non-blocking, a zero latency budget disables Nagle, and the live profile
//! bounds the kernel send buffer so a stalled client hits backpressure
//! instead of queueing seconds of audio.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, SocketAddrV4};

use crate::error::TransportError;
use crate::network::engine;
use crate::network::transport::{Connection, Listener, SendError, Transport, TransportOptions};

/// Kernel send buffer for live-profile sockets
const LIVE_SEND_BUFFER: usize = 64 * 1024;

/// Apply the option profile to any socket
fn apply_options(socket: &Socket, options: &TransportOptions) -> Result<(), TransportError> {
    socket
        .set_nonblocking(options.nonblocking)
        .map_err(|e| option_failed("nonblocking", e))?;

    socket
        .set_nodelay(options.latency_ms == 0)
        .map_err(|e| option_failed("nodelay", e))?;

    if options.timestamp_delivery {
        socket
            .set_send_buffer_size(LIVE_SEND_BUFFER)
            .map_err(|e| option_failed("send_buffer_size", e))?;
    }

    Ok(())
}

fn option_failed(option: &'static str, e: io::Error) -> TransportError {
    TransportError::OptionFailed {
        option,
        reason: e.to_string(),
    }
}

/// Transport backed by OS stream sockets
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketTransport;

impl SocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for SocketTransport {
    type Listener = SocketListener;

    fn startup(&self) -> Result<(), TransportError> {
        engine::startup()
    }

    fn listen(
        &self,
        addr: SocketAddrV4,
        options: &TransportOptions,
        backlog: i32,
    ) -> Result<SocketListener, TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| TransportError::SocketFailed(e.to_string()))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| option_failed("reuse_address", e))?;
        apply_options(&socket, options)?;

        socket
            .bind(&SockAddr::from(SocketAddr::V4(addr)))
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", addr, e)))?;
        socket
            .listen(backlog)
            .map_err(|e| TransportError::ListenFailed(e.to_string()))?;

        Ok(SocketListener {
            socket,
            options: *options,
        })
    }
}

/// Listening stream socket
#[derive(Debug)]
pub struct SocketListener {
    socket: Socket,
    options: TransportOptions,
}

impl Listener for SocketListener {
    type Conn = SocketConnection;

    fn accept(&mut self) -> Result<Option<SocketConnection>, TransportError> {
        match self.socket.accept() {
            Ok((socket, peer)) => {
                // Accepted sockets do not reliably inherit non-blocking mode
                apply_options(&socket, &self.options)?;
                Ok(Some(SocketConnection {
                    socket,
                    peer: peer.as_socket(),
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(TransportError::AcceptFailed(e.to_string())),
        }
    }

    fn payload_size(&self) -> Option<usize> {
        None
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok().and_then(|a| a.as_socket())
    }
}

/// Connected client socket
#[derive(Debug)]
pub struct SocketConnection {
    socket: Socket,
    peer: Option<SocketAddr>,
}

impl Connection for SocketConnection {
    fn send(&mut self, buf: &[u8]) -> Result<usize, SendError> {
        match self.socket.send(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                Err(SendError::WouldBlock)
            }
            Err(e) => Err(SendError::Fatal(e.to_string())),
        }
    }

    fn configure(&mut self, options: &TransportOptions) -> Result<(), TransportError> {
        apply_options(&self.socket, options)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}
