//! Repository traits for metadata persistence.

use crate::error::MetadataResult;
use async_trait::async_trait;
use quarry_core::{Blob, DigestAddress, UploadSession};

/// Persistence operations for upload session records.
#[async_trait]
pub trait UploadSessionRepo: Send + Sync {
    /// Look up a session by upload id.
    async fn find_session(&self, upload_id: &str) -> MetadataResult<Option<UploadSession>>;

    /// Insert or update a session record.
    async fn save_session(&self, session: &UploadSession) -> MetadataResult<()>;

    /// Check whether a session exists for the id.
    async fn session_exists(&self, upload_id: &str) -> MetadataResult<bool>;

    /// Atomically move a session from Active to Finalizing.
    ///
    /// Returns the post-transition record. If the session is already past
    /// Active the record is returned unchanged; the stored status tells the
    /// caller which case occurred. Errors with `NotFound` if no session
    /// exists for the id.
    async fn begin_finalize(&self, upload_id: &str) -> MetadataResult<UploadSession>;
}

/// Persistence operations for finalized blob records.
#[async_trait]
pub trait BlobRepo: Send + Sync {
    /// Look up a blob record by digest.
    async fn find_blob(&self, digest: &DigestAddress) -> MetadataResult<Option<Blob>>;

    /// Insert a blob record, keeping the existing record if one is already
    /// present for the digest. Blob records are immutable once written.
    async fn save_blob(&self, blob: &Blob) -> MetadataResult<()>;

    /// Check whether a blob record exists for the digest.
    async fn blob_exists(&self, digest: &DigestAddress) -> MetadataResult<bool>;
}
