//! Error types for jungle-chat

use thiserror::Error;

/// Result type alias using jungle-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during chat operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the chat endpoint layer
    #[error(transparent)]
    Ai(#[from] jungle_ai::Error),

    /// Reading or writing the local store failed
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Stored conversation could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if the failed request is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Ai(e) => e.is_retryable(),
            _ => false,
        }
    }
}
