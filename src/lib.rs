//! # Broadcast Audio Sink
//!
//! Serves a continuous stream of decoded audio to any number of network
//! listeners at once, without ever blocking the pipeline that produces it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                     Upstream audio pipeline                          │
//! │          (one call per block: write / write_stereo / send_bytes)     │
//! └──────────────────────────────────┬───────────────────────────────────┘
//!                                    │ f32 samples or opaque bytes
//!                                    ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                     AudioSink (sink::stream)                         │
//! │  ┌────────────────────────────────────────────────────────────────┐  │
//! │  │  Format pipeline (audio::format)                               │  │
//! │  │  interleave ──▶ clip + quantize i16 ──▶ linear resample        │  │
//! │  │  (pre-sized scratch buffers, oversized blocks dropped)         │  │
//! │  └───────────────────────────────┬────────────────────────────────┘  │
//! │                                  ▼                                   │
//! │  ┌────────────────┐   ┌─────────────────────┐   ┌─────────────────┐  │
//! │  │ Acceptor       │──▶│ Client registry     │◀──│ Fan-out sender  │  │
//! │  │ drain pending  │   │ (sink::registry)    │   │ WAV header once │  │
//! │  │ connections    │   │                     │   │ chunked sends   │  │
//! │  └────────────────┘   └─────────────────────┘   └────────┬────────┘  │
//! └──────────────────────────────────────────────────────────┼───────────┘
//!                                                            │ non-blocking
//!                                                            ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │            Transport (network::transport) - socket / memory          │
//! │   would-block: drop this call's tail    fatal: evict that client     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod network;
pub mod sink;

pub use error::{Error, Result};

/// Sink-wide constants
pub mod constants {
    /// Default rate the upstream pipeline produces at (Hz)
    pub const DEFAULT_NATIVE_RATE: u32 = 8000;

    /// Default listen address
    pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";

    /// Default listen port
    pub const DEFAULT_LISTEN_PORT: &str = "8890";

    /// Latency budget of the live profile in milliseconds
    pub const LIVE_LATENCY_MS: u32 = 120;

    /// Chunk size used when the transport does not report one
    pub const DEFAULT_PAYLOAD_SIZE: usize = 1316;

    /// Pending-connection backlog of the listening endpoint
    pub const LISTEN_BACKLOG: i32 = 5;
}
