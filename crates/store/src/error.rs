//! Error types for the upload and blob storage engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed identifiers, out-of-range offsets or limits.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Operation attempted against a session or blob in the wrong state.
    /// The client may retry after re-querying current state.
    #[error("precondition failed: {0}")]
    FailedPrecondition(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Integrity violation or conflicting upload attempt. The session has
    /// been marked Failed; the error is fatal for that upload id.
    #[error("corrupt: {0}")]
    Corrupt(String),

    #[error("metadata error: {0}")]
    Metadata(#[from] quarry_metadata::MetadataError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
