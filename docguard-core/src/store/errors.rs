/*
    errors.rs - Error types for the document store client

    Three signals are recognized and handled by callers:
    - AlreadyExists on database creation
    - NotFound on database destruction and document reads
    - Conflict on document writes (stale or missing revision)

    Everything else is fatal for the operation that raised it.
*/

use std::sync::PoisonError;
use thiserror::Error;

/// Errors returned by a [`DocumentStore`](super::DocumentStore)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Database already exists
    #[error("Database already exists: {0}")]
    AlreadyExists(String),

    /// Database or document not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Revision mismatch on write
    #[error("Document update conflict: {0}")]
    Conflict(String),

    /// Store answered with an unexpected status
    #[error("Store returned {status} ({error}): {reason}")]
    Http { status: u16, error: String, reason: String },

    /// Request never got an answer (connect failure, timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Store answered with a body we could not interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Document body is not a JSON object
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Database name or document id cannot be turned into a request URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::InvalidResponse(err.to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidResponse(err.to_string())
    }
}

/// Helper to convert poison errors into StoreError
pub(crate) fn handle_poison<T>(_err: PoisonError<T>) -> StoreError {
    StoreError::Internal("Lock poisoned: a thread panicked while holding the lock".to_string())
}
