//! Error types for referring segmentation data loading

use std::io;
use thiserror::Error;

/// Result type for data loading operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for data loading operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Index out of bounds
    #[error("Index {index} out of bounds for dataset of length {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Number of available items
        len: usize,
    },

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration value (mode, sentence policy, dataset name, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A key was not present in the record store
    #[error("Key not found in store: {0}")]
    KeyNotFound(String),

    /// A stored record failed validation after deserialization
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Tokenized text does not fit the context length and truncation is off
    #[error("Input {text:?} is too long for context length {context_length}")]
    TextTooLong {
        /// The offending input text
        text: String,
        /// The configured context length
        context_length: usize,
    },

    /// Array shapes that must agree do not
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Error raised by the underlying text tokenizer
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Transformation error
    #[error("Transformation error: {0}")]
    TransformationError(String),
}
