//! Per-client delivery of one payload
//!
//! Each client is handled on its own: backpressure cuts this call short for
//! that client only, and a fatal send evicts that client only.

use crate::network::{Connection, SendError};
use crate::sink::registry::ClientRegistry;

/// Result of fanning one payload out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Clients admitted just before sending
    pub admitted: usize,
    /// Clients that received the whole payload
    pub delivered: usize,
    /// Clients whose tail was dropped because their send buffer was full
    pub truncated: usize,
    /// Clients closed after a fatal send
    pub evicted: usize,
    /// Payload bytes accepted across all clients
    pub bytes_sent: usize,
}

/// How far one client's delivery got
#[derive(Debug, PartialEq, Eq)]
enum Delivery {
    Complete(usize),
    Truncated(usize),
    Failed(String),
}

/// Send `payload` in chunks of at most `chunk_size` bytes
fn send_chunked<C: Connection>(conn: &mut C, payload: &[u8], chunk_size: usize) -> Delivery {
    let chunk_size = chunk_size.max(1);
    let mut sent = 0;
    while sent < payload.len() {
        let end = (sent + chunk_size).min(payload.len());
        match conn.send(&payload[sent..end]) {
            Ok(0) => return Delivery::Truncated(sent),
            Ok(n) => sent += n,
            Err(SendError::WouldBlock) => return Delivery::Truncated(sent),
            Err(SendError::Fatal(reason)) => return Delivery::Failed(reason),
        }
    }
    Delivery::Complete(sent)
}

/// Deliver `payload` to every client, preceded by `header` for clients that
/// have not had it yet
///
/// The header is attempted once per client: its flag is set whatever the
/// send outcome, and the payload follows regardless.
pub fn fan_out<C: Connection>(
    registry: &mut ClientRegistry<C>,
    header: Option<&[u8]>,
    payload: &[u8],
    chunk_size: usize,
) -> FanOutReport {
    let mut report = FanOutReport::default();

    let evicted = registry.retain_mut(|client| {
        if let Some(header) = header {
            if !client.header_sent {
                if let Err(e) = client.conn_mut().send(header) {
                    tracing::debug!("Client {}: header not delivered: {}", client.id(), e);
                }
                client.header_sent = true;
            }
        }

        match send_chunked(client.conn_mut(), payload, chunk_size) {
            Delivery::Complete(n) => {
                report.delivered += 1;
                report.bytes_sent += n;
                true
            }
            Delivery::Truncated(n) => {
                tracing::trace!(
                    "Client {}: send buffer full, dropped {} of {} bytes",
                    client.id(),
                    payload.len() - n,
                    payload.len()
                );
                report.truncated += 1;
                report.bytes_sent += n;
                true
            }
            Delivery::Failed(reason) => {
                tracing::info!("Client {} disconnected: {}", client.id(), reason);
                false
            }
        }
    });
    report.evicted = evicted;

    report
}
