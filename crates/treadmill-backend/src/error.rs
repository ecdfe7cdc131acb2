//! Error types for the coordination-store backend.

use thiserror::Error;

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced by a `Backend` implementation.
///
/// Maps to the error kinds of the error-handling design: `NotFound` and
/// `Conflict` are recoverable at the callsite, `Unauthorized` and the
/// storage-layer variants are treated as fatal by callers that need
/// single-writer guarantees.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("node already exists: {0}")]
    Conflict(String),

    #[error("acl rejected write to {0}")]
    Unauthorized(String),

    #[error("transient store error: {0}")]
    Transient(String),

    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl BackendError {
    /// True for errors that individual loader entities should recover from
    /// locally (warn + skip), per the error-handling policy.
    pub fn is_recoverable_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }
}
