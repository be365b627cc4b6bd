//! Error types for dataset readers

use thiserror::Error;

/// Error type for dataset readers
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] refseg_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON format error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image decoding or encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Format error
    #[error("Format error: {0}")]
    Format(String),
}

impl Error {
    /// Whether this error stems from a bad configuration value
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Core(refseg_core::Error::Config(_)))
    }
}

/// Result type for dataset readers
pub type Result<T> = std::result::Result<T, Error>;
