//! Network subsystem: transport seam and backends

pub mod engine;
pub mod memory;
pub mod socket;
pub mod transport;

pub use memory::{MemoryPeer, MemoryTransport, PeerBehavior};
pub use socket::SocketTransport;
pub use transport::{Connection, Listener, SendError, Transport, TransportOptions};
