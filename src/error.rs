//! Error types for obra-tracker

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Missing identifier: {0}")]
    MissingIdentifier(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Source unreadable: {0}")]
    SourceUnreadable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A create lost a race to a concurrent insert of the same
    /// normalized name. Resolvers recover from this by re-querying;
    /// it is never surfaced to callers.
    #[error("Uniqueness conflict: {0}")]
    Conflict(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
