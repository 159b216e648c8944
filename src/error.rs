//! Error types for hark

use thiserror::Error;

/// Result type alias for hark operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hark
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Wake word detector error
    #[error("detector error: {0}")]
    Detector(String),

    /// Speech recognition error
    #[error("recognizer error: {0}")]
    Recognizer(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Command API error (non-success status, bad payload)
    #[error("backend error: {0}")]
    Backend(String),

    /// Status lock error
    #[error("status lock error: {0}")]
    Lock(String),

    /// Supervisor error (terminal restart-policy failures)
    #[error("supervisor error: {0}")]
    Supervisor(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
