//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("invalid hasher state: {0}")]
    InvalidHasherState(String),

    #[error("invalid session token: {0}")]
    InvalidSessionToken(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
