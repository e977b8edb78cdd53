//! Error types for waypoint-core

use thiserror::Error;

/// Result type alias using waypoint-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in waypoint-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected input (empty title, out-of-range coordinate, too many attachments)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown note or attachment id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Attachment media could not be persisted
    #[error("Media write error: {0}")]
    MediaWrite(String),

    /// Stored media reference no longer resolves to readable bytes
    #[error("Media not found: {0}")]
    MediaNotFound(String),

    /// Underlying database failure
    #[error("Storage error: {0}")]
    Storage(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
