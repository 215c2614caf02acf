//! Error types for keepsake-core

use thiserror::Error;

/// Result type alias using keepsake-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in keepsake-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// No signed-in identity; blocks any sync activity
    #[error("Not authenticated: no current identity")]
    NotAuthenticated,

    /// Network-level failure talking to a remote store
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Malformed server payload
    #[error("Decode failure: {0}")]
    Decode(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Media/object storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}
