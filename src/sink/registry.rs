//! Connected client registry

use std::net::SocketAddr;

use crate::network::Connection;

/// One connected listener
pub struct Client<C> {
    id: u64,
    conn: C,
    peer: Option<SocketAddr>,
    /// Framing header already attempted
    pub header_sent: bool,
}

impl<C: Connection> Client<C> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn conn_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

/// Clients in admission order
///
/// Dropping a [`Client`] closes its connection, so removal is eviction.
pub struct ClientRegistry<C> {
    clients: Vec<Client<C>>,
    next_id: u64,
}

impl<C: Connection> ClientRegistry<C> {
    pub fn new() -> Self {
        Self {
            clients: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a freshly accepted connection, returning its id
    pub fn admit(&mut self, conn: C) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let peer = conn.peer_addr();
        self.clients.push(Client {
            id,
            conn,
            peer,
            header_sent: false,
        });
        id
    }

    /// Visit every client; those for which `f` returns `false` are closed and removed
    ///
    /// Order of the survivors is preserved. Returns the number removed.
    pub fn retain_mut<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&mut Client<C>) -> bool,
    {
        let before = self.clients.len();
        self.clients.retain_mut(|client| f(client));
        before - self.clients.len()
    }

    /// Close and drop every client
    pub fn close_all(&mut self) -> usize {
        let n = self.clients.len();
        self.clients.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.clients.iter().map(|c| c.id).collect()
    }
}

impl<C: Connection> Default for ClientRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Listener, MemoryTransport, Transport, TransportOptions};
    use std::net::{Ipv4Addr, SocketAddrV4};

    #[test]
    fn test_admit_and_evict() {
        let transport = MemoryTransport::new();
        let peers: Vec<_> = (0..3).map(|_| transport.connect()).collect();
        let mut listener = transport
            .listen(
                SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
                &TransportOptions::for_profile(Default::default()),
                5,
            )
            .unwrap();

        let mut registry = ClientRegistry::new();
        while let Some(conn) = listener.accept().unwrap() {
            registry.admit(conn);
        }
        assert_eq!(registry.ids(), vec![1, 2, 3]);

        let removed = registry.retain_mut(|c| c.id() != 2);
        assert_eq!(removed, 1);
        assert_eq!(registry.ids(), vec![1, 3]);
        assert!(peers[1].is_closed());
        assert!(!peers[0].is_closed());

        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
        assert!(peers.iter().all(|p| p.is_closed()));
    }
}
