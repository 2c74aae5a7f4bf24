//! Error types for slp-relay.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for all relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// I/O error during file or socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration values are out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Protocol error (malformed handshake, truncated payload, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A value could not be expressed in the replay object notation.
    #[error("Encode error: {0}")]
    Encode(String),

    /// The output file for a new recording could not be created.
    #[error("Failed to open recording {path}: {source}")]
    OpenRecording {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scene backend rejected a request.
    #[error("Scene backend error: {0}")]
    Scene(String),

    /// A relay client received nothing for the idle timeout.
    #[error("Relay client idle for {0:?}")]
    IdleTimeout(std::time::Duration),

    /// The relay service has shut down.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;
