//! Error types for wishsync-core

use thiserror::Error;

/// Result type alias using wishsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in wishsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Persistence layer unavailable or full; the attempted queue
    /// operation did not happen and must be surfaced to the user
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed action type or payload, rejected at enqueue time
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Queued action not found
    #[error("Action not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid sync configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Conflict resolution bookkeeping error (unknown or already
    /// resolved conflict)
    #[error("Resolution error: {0}")]
    Resolution(String),
}
