//! Domain errors for the mirrorcache system.

use thiserror::Error;

/// Errors raised while decoding or encoding wire frames.
///
/// None of these escape to `get`/`set` callers; the mirror logs them and
/// moves on to the next frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unknown message kind: {0}")]
    UnknownKind(String),

    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Channel {channel} is closed")]
    Closed { channel: String },

    #[error("Cache service is not running")]
    ServiceUnavailable,
}

/// Errors returned when opening a mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("No tokio runtime available to drive the mirror")]
    NoRuntime,

    #[error("Invalid cache name: {0:?}")]
    InvalidName(String),

    #[error("Invalid channel prefix: {0:?}")]
    InvalidPrefix(String),

    #[error("Mirror registry has been shut down")]
    RegistryShutdown,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors returned by the cache service handle.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Cache service has stopped")]
    Stopped,
}

pub type MirrorResult<T> = Result<T, MirrorError>;
