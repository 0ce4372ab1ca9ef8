//! Error types for ollamab-core

use thiserror::Error;

/// Core error types for the ollamab library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive-related error occurred
    #[error("Archive error: {0}")]
    Archive(String),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Invalid file or directory path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Unsupported codec name
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Configuration-related error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error for other cases
    #[error("Other error: {0}")]
    Other(String),
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::Io(err.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
