//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint not found in storage
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Stored checkpoint data could not be decoded
    #[error("Corrupted checkpoint: {0}")]
    Corrupted(String),

    /// The workflow being resumed no longer matches the checkpointed graph
    ///
    /// Raised by the graph-signature guard on resume. The message always
    /// begins with "Workflow graph has changed" so callers can match on it.
    #[error("Workflow graph has changed: {0}")]
    GraphMismatch(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary serialization error
    #[error("Binary serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),

    /// Invalid checkpoint or storage operation
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
