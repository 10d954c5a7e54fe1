//! Common error types for RDL

use thiserror::Error;

/// Common result type for RDL operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the loader, config layer and player
#[derive(Error, Debug)]
pub enum Error {
    /// Network request failed or returned a non-success status
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response body or file could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
