//! Broadcast sink lifecycle and write entry points
//!
//! An [`AudioSink`] owns a listening endpoint, the connected clients and the
//! scratch buffers used for format conversion. It has no thread of its own:
//! every write admits pending connections, converts the block and fans it out
//! before returning, and nothing along that path blocks.

use std::net::SocketAddr;

use crate::audio::{framing_header, ScratchBuffers, Overflow, WAV_HEADER_LEN};
use crate::config::StreamConfig;
use crate::constants::{DEFAULT_PAYLOAD_SIZE, LISTEN_BACKLOG};
use crate::error::{Result, TransportError};
use crate::network::socket::SocketListener;
use crate::network::{Listener, Transport, TransportOptions};
use crate::sink::acceptor::drain_pending;
use crate::sink::fanout::{fan_out, FanOutReport};
use crate::sink::registry::ClientRegistry;

/// Why a block was not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The sink has been shut down
    NotListening,
    /// The block is larger than the buffers were sized for
    Oversized(Overflow),
    /// Stereo input on a sink configured without a stereo buffer
    NoStereoBuffer,
    /// Left and right blocks differ in length
    ChannelMismatch { left: usize, right: usize },
}

/// What happened to one written block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Sent(FanOutReport),
    Dropped(DropReason),
}

impl WriteOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, WriteOutcome::Sent(_))
    }

    pub fn report(&self) -> Option<&FanOutReport> {
        match self {
            WriteOutcome::Sent(report) => Some(report),
            WriteOutcome::Dropped(_) => None,
        }
    }
}

/// Running totals since initialization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub clients_accepted: u64,
    pub clients_evicted: u64,
    pub payloads_sent: u64,
    pub bytes_sent: u64,
    /// Client deliveries cut short by backpressure
    pub truncations: u64,
    pub blocks_dropped: u64,
}

impl SinkStats {
    fn record(&mut self, outcome: &WriteOutcome) {
        match outcome {
            WriteOutcome::Sent(report) => {
                self.clients_accepted += report.admitted as u64;
                self.clients_evicted += report.evicted as u64;
                self.payloads_sent += 1;
                self.bytes_sent += report.bytes_sent as u64;
                self.truncations += report.truncated as u64;
            }
            WriteOutcome::Dropped(_) => self.blocks_dropped += 1,
        }
    }
}

/// Listening side of a running sink
struct Endpoint<L: Listener> {
    listener: L,
    registry: ClientRegistry<L::Conn>,
    options: TransportOptions,
    header: Option<[u8; WAV_HEADER_LEN]>,
    payload_size: usize,
}

impl<L: Listener> Endpoint<L> {
    fn broadcast(&mut self, payload: &[u8]) -> FanOutReport {
        let admitted = drain_pending(&mut self.listener, &mut self.registry, &self.options);
        let header = self.header.as_ref().map(|h| &h[..]);
        let mut report = fan_out(&mut self.registry, header, payload, self.payload_size);
        report.admitted = admitted;
        report
    }

    /// Close every client, then the listener
    fn close(mut self) -> usize {
        self.registry.close_all()
    }
}

/// Broadcast sink over any [`Transport`]
pub struct AudioSink<L: Listener> {
    config: StreamConfig,
    endpoint: Option<Endpoint<L>>,
    buffers: ScratchBuffers,
    stats: SinkStats,
}

/// Sink over OS stream sockets
pub type SocketSink = AudioSink<SocketListener>;

impl<L: Listener> AudioSink<L> {
    /// Allocate buffers for blocks of up to `max_block_len` bytes and start listening
    ///
    /// On failure everything acquired so far is released.
    pub fn initialize<T>(transport: &T, config: StreamConfig, max_block_len: usize) -> Result<Self>
    where
        T: Transport<Listener = L>,
    {
        config.validate()?;

        let buffers = ScratchBuffers::for_config(&config, max_block_len);
        let options = TransportOptions::for_profile(config.latency);

        let listener = match open_listener(transport, &config, &options) {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!("Audio sink failed to start: {}", e);
                return Err(e.into());
            }
        };

        let payload_size = listener.payload_size().unwrap_or(DEFAULT_PAYLOAD_SIZE);
        tracing::info!(
            "Audio sink listening on {}:{} ({:?}, {:?}, {} Hz -> {} Hz, payload {} bytes)",
            config.listen_address,
            config.listen_port,
            config.format,
            config.mode,
            config.native_rate,
            config.sample_rate,
            payload_size
        );

        Ok(Self {
            endpoint: Some(Endpoint {
                listener,
                registry: ClientRegistry::new(),
                options,
                header: framing_header(&config),
                payload_size,
            }),
            config,
            buffers,
            stats: SinkStats::default(),
        })
    }

    /// Write a block of mono (or already interleaved) float samples
    pub fn write(&mut self, samples: &[f32]) -> WriteOutcome {
        let outcome = match self.endpoint.as_mut() {
            None => WriteOutcome::Dropped(DropReason::NotListening),
            Some(endpoint) if self.config.needs_quantization() => {
                match self.buffers.pcm_from(samples) {
                    Ok(pcm) => WriteOutcome::Sent(endpoint.broadcast(bytemuck::cast_slice(pcm))),
                    Err(overflow) => WriteOutcome::Dropped(DropReason::Oversized(overflow)),
                }
            }
            Some(endpoint) => WriteOutcome::Sent(endpoint.broadcast(bytemuck::cast_slice(samples))),
        };
        self.finish(outcome)
    }

    /// Write separate left and right channel blocks
    pub fn write_stereo(&mut self, left: &[f32], right: &[f32]) -> WriteOutcome {
        let outcome = match self.endpoint.as_mut() {
            None => WriteOutcome::Dropped(DropReason::NotListening),
            Some(_) if !self.buffers.has_stereo() => WriteOutcome::Dropped(DropReason::NoStereoBuffer),
            Some(_) if left.len() != right.len() => WriteOutcome::Dropped(DropReason::ChannelMismatch {
                left: left.len(),
                right: right.len(),
            }),
            Some(endpoint) if self.config.needs_quantization() => {
                match self.buffers.pcm_from_stereo(left, right) {
                    Ok(pcm) => WriteOutcome::Sent(endpoint.broadcast(bytemuck::cast_slice(pcm))),
                    Err(overflow) => WriteOutcome::Dropped(DropReason::Oversized(overflow)),
                }
            }
            Some(endpoint) => match self.buffers.interleave(left, right) {
                Ok(frames) => WriteOutcome::Sent(endpoint.broadcast(bytemuck::cast_slice(frames))),
                Err(overflow) => WriteOutcome::Dropped(DropReason::Oversized(overflow)),
            },
        };
        self.finish(outcome)
    }

    /// Forward pre-encoded bytes untouched
    pub fn send_bytes(&mut self, data: &[u8]) -> WriteOutcome {
        let outcome = match self.endpoint.as_mut() {
            None => WriteOutcome::Dropped(DropReason::NotListening),
            Some(endpoint) => WriteOutcome::Sent(endpoint.broadcast(data)),
        };
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: WriteOutcome) -> WriteOutcome {
        match &outcome {
            WriteOutcome::Dropped(DropReason::NotListening) => {}
            WriteOutcome::Dropped(reason) => tracing::debug!("Dropped audio block: {:?}", reason),
            WriteOutcome::Sent(_) => {}
        }
        self.stats.record(&outcome);
        outcome
    }

    /// Close all clients and the listener and free the buffers
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            let closed = endpoint.close();
            tracing::info!(
                "Audio sink on {}:{} shut down, closed {} client(s)",
                self.config.listen_address,
                self.config.listen_port,
                closed
            );
        }
        self.buffers.release();
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }

    pub fn buffers(&self) -> &ScratchBuffers {
        &self.buffers
    }

    pub fn is_listening(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn client_count(&self) -> usize {
        self.endpoint.as_ref().map_or(0, |e| e.registry.len())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().and_then(|e| e.listener.local_addr())
    }

    /// Largest chunk sent in one transport call
    pub fn payload_size(&self) -> Option<usize> {
        self.endpoint.as_ref().map(|e| e.payload_size)
    }
}

impl<L: Listener> Drop for AudioSink<L> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn open_listener<T: Transport>(
    transport: &T,
    config: &StreamConfig,
    options: &TransportOptions,
) -> std::result::Result<T::Listener, TransportError> {
    transport.startup()?;
    let addr = config.listen_socket_addr()?;
    transport.listen(addr, options, LISTEN_BACKLOG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::quantize_sample;
    use crate::config::{ChannelMode, LatencyProfile, PayloadFormat};
    use crate::error::Error;
    use crate::network::memory::MemoryListener;
    use crate::network::{MemoryTransport, PeerBehavior};

    const BLOCK_BYTES: usize = 64 * 4;

    fn config(format: PayloadFormat, mode: ChannelMode) -> StreamConfig {
        StreamConfig {
            format,
            mode,
            listen_address: "127.0.0.1".into(),
            listen_port: "0".into(),
            ..Default::default()
        }
    }

    fn sink(transport: &MemoryTransport, config: StreamConfig) -> AudioSink<MemoryListener> {
        AudioSink::initialize(transport, config, BLOCK_BYTES).unwrap()
    }

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        bytemuck::cast_slice(samples).to_vec()
    }

    #[test]
    fn test_initialize_listens_with_profile() {
        let transport = MemoryTransport::new();
        let mut cfg = config(PayloadFormat::Pcm, ChannelMode::Mono);
        cfg.latency = LatencyProfile::LowLatency;
        let sink = sink(&transport, cfg);

        assert!(sink.is_listening());
        assert!(transport.listener_open());
        assert_eq!(
            transport.listener_options(),
            Some(TransportOptions::for_profile(LatencyProfile::LowLatency))
        );
        assert_eq!(sink.client_count(), 0);
        assert_eq!(sink.payload_size(), Some(DEFAULT_PAYLOAD_SIZE));
    }

    #[test]
    fn test_payload_size_from_transport() {
        let transport = MemoryTransport::new();
        transport.set_payload_size(Some(8));
        let mut sink = sink(&transport, config(PayloadFormat::Pcm, ChannelMode::Mono));
        let peer = transport.connect();

        sink.write(&[0.0; 10]);
        let sizes: Vec<_> = peer.chunks().iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![8, 8, 4]);
    }

    #[test]
    fn test_startup_failure() {
        let transport = MemoryTransport::new();
        transport.fail_startup(true);
        let result = AudioSink::initialize(&transport, config(PayloadFormat::Wav, ChannelMode::Mono), BLOCK_BYTES);
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::StartupFailed(_)))
        ));
        assert!(!transport.listener_open());
    }

    #[test]
    fn test_bind_failure_releases_everything() {
        let transport = MemoryTransport::new();
        transport.fail_listen(true);
        let result = AudioSink::initialize(&transport, config(PayloadFormat::Wav, ChannelMode::Mono), BLOCK_BYTES);
        assert!(matches!(result, Err(Error::Transport(TransportError::BindFailed(_)))));
        assert!(!transport.listener_open());
    }

    #[test]
    fn test_invalid_address_is_startup_failure() {
        let transport = MemoryTransport::new();
        let mut cfg = config(PayloadFormat::Wav, ChannelMode::Mono);
        cfg.listen_address = "256.1.1.1".into();
        let result = AudioSink::initialize(&transport, cfg, BLOCK_BYTES);
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::InvalidAddress(_)))
        ));
        assert!(!transport.listener_open());
    }

    #[test]
    fn test_clients_admitted_with_profile_options() {
        let transport = MemoryTransport::new();
        let mut sink = sink(&transport, config(PayloadFormat::Pcm, ChannelMode::Mono));
        let peer = transport.connect();

        let outcome = sink.write(&[0.25; 4]);
        assert_eq!(outcome.report().unwrap().admitted, 1);
        assert_eq!(sink.client_count(), 1);
        assert_eq!(
            peer.options(),
            Some(TransportOptions::for_profile(LatencyProfile::Live))
        );
        assert_eq!(peer.received(), pcm_bytes(&[quantize_sample(0.25); 4]));
    }

    #[test]
    fn test_fan_out_isolation() {
        let transport = MemoryTransport::new();
        let mut sink = sink(&transport, config(PayloadFormat::Pcm, ChannelMode::Mono));
        let failing = transport.connect();
        let healthy = transport.connect();
        failing.set_behavior(PeerBehavior::Disconnected);

        let outcome = sink.write(&[0.5; 16]);
        let report = outcome.report().unwrap();
        assert_eq!(report.evicted, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(sink.client_count(), 1);
        assert!(failing.is_closed());
        assert_eq!(healthy.received(), pcm_bytes(&[quantize_sample(0.5); 16]));
        assert_eq!(sink.stats().clients_evicted, 1);
    }

    #[test]
    fn test_wav_header_once_per_client() {
        let transport = MemoryTransport::new();
        let mut sink = sink(&transport, config(PayloadFormat::Wav, ChannelMode::Mono));
        let early = transport.connect();

        for _ in 0..5 {
            sink.write(&[0.1; 8]);
        }
        let late = transport.connect();
        for _ in 0..3 {
            sink.write(&[0.1; 8]);
        }

        for (peer, writes) in [(&early, 8), (&late, 3)] {
            let chunks = peer.chunks();
            assert_eq!(chunks.len(), writes + 1);
            assert_eq!(chunks[0].len(), WAV_HEADER_LEN);
            assert_eq!(&chunks[0][0..4], b"RIFF");
            assert!(chunks[1..].iter().all(|c| c.len() == 16 && &c[0..4] != b"RIFF"));
        }
    }

    #[test]
    fn test_oversized_write_is_dropped_cleanly() {
        let transport = MemoryTransport::new();
        let mut sink = sink(&transport, config(PayloadFormat::Wav, ChannelMode::Mono));
        let peer = transport.connect();
        let capacity = sink.buffers().pcm_capacity();

        let outcome = sink.write(&vec![0.9; capacity + 1]);
        assert_eq!(
            outcome,
            WriteOutcome::Dropped(DropReason::Oversized(Overflow {
                needed: capacity + 1,
                capacity,
            }))
        );
        // No admission, no sends
        assert_eq!(transport.pending(), 1);
        assert!(peer.chunks().is_empty());
        assert_eq!(sink.stats().blocks_dropped, 1);

        let outcome = sink.write(&[-0.5; 4]);
        assert!(outcome.is_sent());
        let received = peer.received();
        assert_eq!(&received[WAV_HEADER_LEN..], &pcm_bytes(&[quantize_sample(-0.5); 4])[..]);
        assert_eq!(sink.buffers().pcm_capacity(), capacity);
    }

    #[test]
    fn test_resampled_pcm() {
        let transport = MemoryTransport::new();
        let mut cfg = config(PayloadFormat::Pcm, ChannelMode::Mono);
        cfg.native_rate = 8000;
        cfg.sample_rate = 16000;
        let mut sink = sink(&transport, cfg);
        let peer = transport.connect();

        sink.write(&[0.0, 1.0]);
        let expected: Vec<i16> = vec![0, 16383, 32767, 32767];
        assert_eq!(peer.received(), pcm_bytes(&expected));
    }

    #[test]
    fn test_stereo_pcm_interleaved() {
        let transport = MemoryTransport::new();
        let mut sink = sink(&transport, config(PayloadFormat::Pcm, ChannelMode::Stereo));
        let peer = transport.connect();

        sink.write_stereo(&[1.0, 0.5], &[-1.0, 0.0]);
        let expected = [32767, -32767, 16383, 0];
        assert_eq!(peer.received(), pcm_bytes(&expected));
    }

    #[test]
    fn test_stereo_raw_sends_floats() {
        let transport = MemoryTransport::new();
        let mut sink = sink(&transport, config(PayloadFormat::Raw, ChannelMode::Stereo));
        let peer = transport.connect();

        sink.write_stereo(&[0.25, 2.0], &[-0.75, -3.0]);
        let expected: &[f32] = &[0.25, -0.75, 2.0, -3.0];
        assert_eq!(peer.received(), bytemuck::cast_slice::<f32, u8>(expected).to_vec());
    }

    #[test]
    fn test_stereo_write_rejections() {
        let transport = MemoryTransport::new();
        let mut mono = sink(&transport, config(PayloadFormat::Pcm, ChannelMode::Mono));
        assert_eq!(
            mono.write_stereo(&[0.0], &[0.0]),
            WriteOutcome::Dropped(DropReason::NoStereoBuffer)
        );

        let transport = MemoryTransport::new();
        let mut stereo = sink(&transport, config(PayloadFormat::Pcm, ChannelMode::Stereo));
        assert_eq!(
            stereo.write_stereo(&[0.0, 0.0], &[0.0]),
            WriteOutcome::Dropped(DropReason::ChannelMismatch { left: 2, right: 1 })
        );
    }

    #[test]
    fn test_passthrough_bytes() {
        let transport = MemoryTransport::new();
        let mut sink = sink(&transport, config(PayloadFormat::Passthrough, ChannelMode::Stereo));
        let peer = transport.connect();

        // Frame sync followed by arbitrary payload; the sink never looks inside
        let frame = [0xFF, 0xFB, 0x90, 0x64, 0x00, 0x01, 0x02];
        sink.send_bytes(&frame);
        assert_eq!(peer.received(), frame.to_vec());
        assert_eq!(sink.stats().bytes_sent, frame.len() as u64);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let transport = MemoryTransport::new();
        let mut sink = sink(&transport, config(PayloadFormat::Wav, ChannelMode::Stereo));
        let peer = transport.connect();
        sink.write_stereo(&[0.0; 4], &[0.0; 4]);

        sink.shutdown();
        assert!(!sink.is_listening());
        assert!(!transport.listener_open());
        assert!(peer.is_closed());
        assert_eq!(sink.buffers().stereo_capacity(), 0);
        assert_eq!(sink.buffers().pcm_capacity(), 0);

        sink.shutdown();
        assert!(!sink.is_listening());
        assert_eq!(sink.write(&[0.0]), WriteOutcome::Dropped(DropReason::NotListening));
    }

    #[test]
    fn test_drop_closes_clients() {
        let transport = MemoryTransport::new();
        let peer = transport.connect();
        {
            let mut sink = sink(&transport, config(PayloadFormat::Pcm, ChannelMode::Mono));
            sink.write(&[0.0; 2]);
            assert!(!peer.is_closed());
        }
        assert!(peer.is_closed());
        assert!(!transport.listener_open());
    }

    #[test]
    fn test_socket_loopback_wav() {
        use crate::network::SocketTransport;
        use std::io::Read;
        use std::net::TcpStream;
        use std::time::Duration;

        let mut sink: SocketSink = AudioSink::initialize(
            &SocketTransport::new(),
            config(PayloadFormat::Wav, ChannelMode::Mono),
            BLOCK_BYTES,
        )
        .unwrap();
        let addr = sink.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let mut admitted = false;
        for _ in 0..200 {
            let outcome = sink.write(&[0.5; 4]);
            if outcome.report().map_or(false, |r| r.admitted == 1) {
                admitted = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(admitted);

        let mut buf = [0u8; WAV_HEADER_LEN + 8];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[0..4], b"RIFF");
        assert_eq!(&buf[36..40], b"data");
        assert_eq!(&buf[WAV_HEADER_LEN..], &pcm_bytes(&[quantize_sample(0.5); 4])[..]);

        sink.shutdown();
        assert!(sink.local_addr().is_none());
    }
}
