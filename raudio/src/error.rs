//! Error types for raudio
//!
//! Internal layers (codecs, wave conversion, device setup) propagate these with
//! `?`. The engine's public load functions turn them into "not ready" handles.

use thiserror::Error;

/// Main error type for the raudio crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio decoding errors (corrupt or truncated data)
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// File type or codec the engine cannot handle
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Invalid argument passed by the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared support crate
    #[error(transparent)]
    Common(#[from] raudio_common::Error),
}

/// Convenience Result type using raudio Error
pub type Result<T> = std::result::Result<T, Error>;
