//! Resumable upload engine and content-addressed blob storage.
//!
//! This crate turns a sequence of offset-checked network chunks into a
//! durably stored, content-verified, deduplicated object:
//! - [`UploadManager`] owns the resumable upload state machine
//!   (begin, append, query, complete) and the per-session staging files.
//! - [`BlobStore`] owns finalized blobs: atomic idempotent commit,
//!   metadata query, and chunked streaming download.
//! - [`StoreLayout`] maps upload ids and digests to on-disk paths.

pub mod blobs;
pub mod error;
pub mod locks;
pub mod manager;
pub mod paths;

pub use blobs::{BlobStore, DownloadChunk, DownloadStream};
pub use error::{StoreError, StoreResult};
pub use locks::KeyedLocks;
pub use manager::UploadManager;
pub use paths::StoreLayout;
