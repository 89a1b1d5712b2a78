//! Core domain types and shared logic for the quarry blob store.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content hashes and the resumable incremental hasher
//! - Digest addresses (hash + size) identifying stored blobs
//! - Upload session lifecycle and session tokens
//! - Finalized blob records
//! - Configuration types

pub mod blob;
pub mod config;
pub mod digest;
pub mod error;
pub mod hash;
pub mod upload;

pub use blob::Blob;
pub use digest::DigestAddress;
pub use error::{Error, Result};
pub use hash::{BlobHasher, ContentHash, HasherState};
pub use upload::{SessionToken, UploadSession, UploadStatus};

/// Maximum size of a single download chunk: 4 MiB.
///
/// Download responses are split into chunks no larger than this. The value
/// is deliberately a few MiB: large enough to amortize per-chunk overhead,
/// small enough to bound per-stream memory.
pub const MAX_DOWNLOAD_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Maximum size of a single append payload: 32 MiB.
pub const MAX_APPEND_SIZE: u64 = 32 * 1024 * 1024;
