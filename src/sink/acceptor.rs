//! Admission of pending connections

use crate::network::{Connection, Listener, TransportOptions};
use crate::sink::registry::ClientRegistry;

/// Accept every pending connection into `registry`
///
/// Stops at the first "nothing pending" or accept error; an accept error
/// only ends this drain. Returns the number of clients admitted.
pub fn drain_pending<L: Listener>(
    listener: &mut L,
    registry: &mut ClientRegistry<L::Conn>,
    options: &TransportOptions,
) -> usize {
    let mut admitted = 0;
    loop {
        let mut conn = match listener.accept() {
            Ok(Some(conn)) => conn,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Accept failed, ending drain: {}", e);
                break;
            }
        };

        if let Err(e) = conn.configure(options) {
            tracing::warn!("Failed to configure client connection: {}", e);
        }

        let peer = conn.peer_addr();
        let id = registry.admit(conn);
        admitted += 1;
        match peer {
            Some(addr) => tracing::info!("Client {} connected from {}", id, addr),
            None => tracing::info!("Client {} connected", id),
        }
    }
    admitted
}
