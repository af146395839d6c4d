//! Conversation log error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during conversation log operations.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Conversation not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Conversation already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Corrupt conversation log {} at line {line}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error("Invalid conversation name '{name}'")]
    InvalidName { name: String },

    #[error("Message index {index} out of range (log has {len} messages)")]
    OutOfRange { index: usize, len: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
