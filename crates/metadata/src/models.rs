//! Row types persisted by the metadata store.

use crate::error::{MetadataError, MetadataResult};
use quarry_core::{
    Blob, ContentHash, DigestAddress, HasherState, SessionToken, UploadSession, UploadStatus,
};
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

/// Persisted upload session record.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct UploadSessionRow {
    pub upload_id: String,
    pub session_token: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub staging_path: String,
    pub next_offset: i64,
    pub hasher_state: Option<Vec<u8>>,
    pub status: String,
}

impl UploadSessionRow {
    /// Convert a domain session into its persisted form.
    pub fn from_session(session: &UploadSession) -> Self {
        Self {
            upload_id: session.upload_id.clone(),
            session_token: *session.session_token.as_uuid(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            staging_path: session.staging_path.to_string_lossy().into_owned(),
            next_offset: session.next_offset as i64,
            hasher_state: session
                .hasher_state
                .as_ref()
                .map(|s| s.as_bytes().to_vec()),
            status: session.status.as_str().to_string(),
        }
    }

    /// Convert back into the domain type, validating persisted fields.
    pub fn into_session(self) -> MetadataResult<UploadSession> {
        let status = UploadStatus::parse(&self.status).ok_or_else(|| {
            MetadataError::CorruptRecord(format!(
                "upload {} has unknown status '{}'",
                self.upload_id, self.status
            ))
        })?;
        let next_offset = u64::try_from(self.next_offset).map_err(|_| {
            MetadataError::CorruptRecord(format!(
                "upload {} has negative next_offset {}",
                self.upload_id, self.next_offset
            ))
        })?;
        Ok(UploadSession {
            upload_id: self.upload_id,
            session_token: SessionToken::from_uuid(self.session_token),
            created_at: self.created_at,
            updated_at: self.updated_at,
            staging_path: PathBuf::from(self.staging_path),
            next_offset,
            hasher_state: self.hasher_state.map(HasherState::from_bytes),
            status,
        })
    }
}

/// Persisted blob record, keyed by the digest storage key.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct BlobRow {
    pub digest_key: String,
    pub hash: Vec<u8>,
    pub size_bytes: i64,
    pub created_at: OffsetDateTime,
    pub location: String,
}

impl BlobRow {
    /// Convert a domain blob into its persisted form.
    pub fn from_blob(blob: &Blob) -> Self {
        Self {
            digest_key: blob.digest.storage_key(),
            hash: blob.digest.hash().as_bytes().to_vec(),
            size_bytes: blob.digest.size_bytes() as i64,
            created_at: blob.created_at,
            location: blob.location.to_string_lossy().into_owned(),
        }
    }

    /// Convert back into the domain type, validating persisted fields.
    pub fn into_blob(self) -> MetadataResult<Blob> {
        let hash: [u8; 32] = self.hash.as_slice().try_into().map_err(|_| {
            MetadataError::CorruptRecord(format!(
                "blob {} has hash of {} bytes, expected 32",
                self.digest_key,
                self.hash.len()
            ))
        })?;
        let size_bytes = u64::try_from(self.size_bytes).map_err(|_| {
            MetadataError::CorruptRecord(format!(
                "blob {} has negative size {}",
                self.digest_key, self.size_bytes
            ))
        })?;
        Ok(Blob {
            digest: DigestAddress::new(ContentHash::from_bytes(hash), size_bytes),
            created_at: self.created_at,
            location: PathBuf::from(self.location),
        })
    }
}
