//! Error types for the broadcast audio sink

use thiserror::Error;

/// Main error type for the sink
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport engine and socket errors
///
/// Everything except `AcceptFailed` and `OptionFailed` is a startup failure:
/// the sink is left without a listening endpoint.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport engine failed to start: {0}")]
    StartupFailed(String),

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("Socket creation failed: {0}")]
    SocketFailed(String),

    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Listen failed: {0}")]
    ListenFailed(String),

    #[error("Accept failed: {0}")]
    AcceptFailed(String),

    #[error("Failed to set socket option {option}: {reason}")]
    OptionFailed { option: &'static str, reason: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for the sink
pub type Result<T> = std::result::Result<T, Error>;
