//! Audio Sink Daemon
//!
//! Serves a generated test tone to every connected listener. Stands in for
//! the real capture pipeline, which drives the sink the same way: one write
//! per produced block.

use anyhow::{bail, Result};
use std::f32::consts::TAU;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use broadcast_audio_sink::{
    config::{ChannelMode, PayloadFormat, StreamConfig},
    network::{engine, SocketTransport},
    sink::{AudioSink, SocketSink},
};

/// Block length produced per tick
const BLOCK_MS: u64 = 20;

/// Seconds between stats lines
const STATS_INTERVAL_SECS: u64 = 10;

/// Sine oscillator used as the upstream pipeline
struct Tone {
    phase: f32,
    step: f32,
}

impl Tone {
    fn new(freq: f32, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            step: TAU * freq / sample_rate as f32,
        }
    }

    fn fill(&mut self, out: &mut [f32]) {
        for s in out.iter_mut() {
            *s = 0.5 * self.phase.sin();
            self.phase = (self.phase + self.step) % TAU;
        }
    }
}

fn load_config() -> Result<StreamConfig> {
    if let Some(path) = std::env::args().nth(1) {
        tracing::info!("Loading config from {}", path);
        return Ok(StreamConfig::load(path)?);
    }
    match StreamConfig::default_path() {
        Some(path) if path.exists() => {
            tracing::info!("Loading config from {}", path.display());
            Ok(StreamConfig::load(path)?)
        }
        _ => Ok(StreamConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting broadcast audio sink");

    let config = load_config()?;
    if config.format == PayloadFormat::Passthrough {
        bail!("passthrough needs an upstream encoder; the test tone only produces samples");
    }

    let block_samples = (config.native_rate as u64 * BLOCK_MS / 1000) as usize;
    let max_block_len = block_samples * std::mem::size_of::<f32>();
    let stereo = config.mode == ChannelMode::Stereo;

    let mut sink: SocketSink = AudioSink::initialize(&SocketTransport::new(), config.clone(), max_block_len)?;

    let mut left_tone = Tone::new(440.0, config.native_rate);
    let mut right_tone = Tone::new(660.0, config.native_rate);
    let mut left = vec![0.0f32; block_samples];
    let mut right = vec![0.0f32; block_samples];

    let mut ticker = tokio::time::interval(Duration::from_millis(BLOCK_MS));
    let mut stats_ticker = tokio::time::interval(Duration::from_secs(STATS_INTERVAL_SECS));

    tracing::info!(
        "Streaming {} ms blocks ({} samples/channel) - press Ctrl+C to stop",
        BLOCK_MS,
        block_samples
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                left_tone.fill(&mut left);
                if stereo {
                    right_tone.fill(&mut right);
                    sink.write_stereo(&left, &right);
                } else {
                    sink.write(&left);
                }
            }
            _ = stats_ticker.tick() => {
                let stats = sink.stats();
                tracing::info!(
                    "Stats: {} clients, {} accepted, {} evicted, {} payloads, {:.1} KB sent, {} truncated, {} dropped",
                    sink.client_count(),
                    stats.clients_accepted,
                    stats.clients_evicted,
                    stats.payloads_sent,
                    stats.bytes_sent as f64 / 1024.0,
                    stats.truncations,
                    stats.blocks_dropped
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    sink.shutdown();
    engine::cleanup();
    Ok(())
}
