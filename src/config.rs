//! Stream configuration
//!
//! A `StreamConfig` is fixed for the lifetime of an [`AudioSink`](crate::sink::AudioSink).
//! It can be built in code, or loaded from a TOML file:
//!
//! ```toml
//! format = "wav"
//! mode = "stereo"
//! native_rate = 8000
//! sample_rate = 16000
//! latency = "live"
//! listen_address = "0.0.0.0"
//! listen_port = "8890"
//! ```

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_LISTEN_ADDRESS, DEFAULT_LISTEN_PORT, DEFAULT_NATIVE_RATE};
use crate::error::{ConfigError, TransportError};

/// Payload format sent to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// Native f32 samples, no conversion
    Raw,
    /// Headerless 16-bit signed PCM
    Pcm,
    /// 16-bit PCM preceded by a streaming WAV header
    #[default]
    Wav,
    /// Pre-encoded bytes (e.g. MP3) forwarded untouched
    Passthrough,
}

/// Channel layout of the upstream pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    #[default]
    Mono,
    Stereo,
}

/// Transport latency profile, applied to the listener and every client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LatencyProfile {
    /// Timestamp-based delivery with late-packet drop and NAK reports
    #[default]
    Live,
    /// No timestamp-based delivery, zero latency budget
    LowLatency,
}

/// Sink configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub format: PayloadFormat,
    pub mode: ChannelMode,
    /// Rate the upstream pipeline produces samples at (Hz)
    pub native_rate: u32,
    /// Rate delivered to clients (Hz)
    pub sample_rate: u32,
    pub latency: LatencyProfile,
    pub listen_address: String,
    pub listen_port: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            format: PayloadFormat::default(),
            mode: ChannelMode::default(),
            native_rate: DEFAULT_NATIVE_RATE,
            sample_rate: DEFAULT_NATIVE_RATE,
            latency: LatencyProfile::default(),
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            listen_port: DEFAULT_LISTEN_PORT.to_string(),
        }
    }
}

impl StreamConfig {
    /// WAV stream at the native rate
    pub fn wav(mode: ChannelMode) -> Self {
        Self {
            format: PayloadFormat::Wav,
            mode,
            ..Default::default()
        }
    }

    /// Opaque pre-encoded passthrough
    pub fn passthrough() -> Self {
        Self {
            format: PayloadFormat::Passthrough,
            ..Default::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Default config file location (`<config dir>/sink.toml`)
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "broadcast-audio-sink")
            .map(|dirs| dirs.config_dir().join("sink.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.native_rate == 0 {
            return Err(ConfigError::Invalid("native_rate must be non-zero".into()));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be non-zero".into()));
        }
        Ok(())
    }

    /// Channel count written to the WAV header
    pub fn channels(&self) -> u16 {
        match self.mode {
            ChannelMode::Mono => 1,
            ChannelMode::Stereo => 2,
        }
    }

    /// PCM and WAV always quantize to 16-bit
    pub fn needs_quantization(&self) -> bool {
        matches!(self.format, PayloadFormat::Pcm | PayloadFormat::Wav)
    }

    /// Quantized formats resample when the target rate differs
    pub fn needs_resampling(&self) -> bool {
        self.needs_quantization() && self.sample_rate != self.native_rate
    }

    /// Parse the dotted-quad listen address and numeric port
    pub fn listen_socket_addr(&self) -> Result<SocketAddrV4, TransportError> {
        let ip: Ipv4Addr = self
            .listen_address
            .trim()
            .parse()
            .map_err(|_| TransportError::InvalidAddress(self.listen_address.clone()))?;
        let port: u16 = self
            .listen_port
            .trim()
            .parse()
            .map_err(|_| TransportError::InvalidAddress(format!("port {}", self.listen_port)))?;
        Ok(SocketAddrV4::new(ip, port))
    }
}
