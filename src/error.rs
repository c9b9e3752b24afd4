//! Error types for the alert pipeline.

use thiserror::Error;

/// Main error type for pipeline operations.
///
/// Most of these never reach a caller: the services catch them where they
/// originate and turn them into a state transition, a dropped frame or a
/// silent no-op. They are still typed so that the boundary code can log them
/// consistently.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Platform unavailable: {0}")]
    PlatformUnavailable(String),

    #[error("Reconnect attempts exhausted after {0} retries")]
    ExhaustedRetries(u32),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for PipelineError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        PipelineError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for PipelineError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        PipelineError::Deserialization(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PipelineError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        PipelineError::Transport(e.to_string())
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
