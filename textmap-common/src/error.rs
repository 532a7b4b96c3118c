//! Common error types for textmap

use thiserror::Error;

/// Common result type for textmap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across textmap services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored task's type tag resolved to a different behavior than the
    /// one that created it
    #[error("Task type mismatch: stored tag '{stored}' does not match '{requested}'")]
    TaskTypeMismatch { stored: String, requested: String },

    /// A task type tag that does not resolve in the registry
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    /// Ambiguous, cyclic, or broken task chain (data integrity violation)
    #[error("Chain error: {0}")]
    Chain(String),

    /// Too few input items for clustering to be meaningful
    #[error("Insufficient data: found {found} texts, need at least {required}")]
    InsufficientData { found: usize, required: usize },

    /// Write-once target already holds an object
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Malformed task parameters against the declared schema
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
