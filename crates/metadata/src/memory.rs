//! In-memory metadata store for tests and ephemeral deployments.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{BlobRepo, UploadSessionRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use quarry_core::{Blob, DigestAddress, UploadSession, UploadStatus};
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// Metadata store backed by in-process maps. All state is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, UploadSession>>,
    blobs: Mutex<HashMap<String, Blob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn migrate(&self) -> MetadataResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        Ok(())
    }
}

#[async_trait]
impl UploadSessionRepo for MemoryStore {
    async fn find_session(&self, upload_id: &str) -> MetadataResult<Option<UploadSession>> {
        Ok(self.sessions.lock().await.get(upload_id).cloned())
    }

    async fn save_session(&self, session: &UploadSession) -> MetadataResult<()> {
        self.sessions
            .lock()
            .await
            .insert(session.upload_id.clone(), session.clone());
        Ok(())
    }

    async fn session_exists(&self, upload_id: &str) -> MetadataResult<bool> {
        Ok(self.sessions.lock().await.contains_key(upload_id))
    }

    async fn begin_finalize(&self, upload_id: &str) -> MetadataResult<UploadSession> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(upload_id).ok_or_else(|| {
            MetadataError::NotFound(format!("upload session {upload_id}"))
        })?;
        if session.status == UploadStatus::Active {
            session.status = UploadStatus::Finalizing;
            session.updated_at = OffsetDateTime::now_utc();
        }
        Ok(session.clone())
    }
}

#[async_trait]
impl BlobRepo for MemoryStore {
    async fn find_blob(&self, digest: &DigestAddress) -> MetadataResult<Option<Blob>> {
        Ok(self.blobs.lock().await.get(&digest.storage_key()).cloned())
    }

    async fn save_blob(&self, blob: &Blob) -> MetadataResult<()> {
        self.blobs
            .lock()
            .await
            .entry(blob.digest.storage_key())
            .or_insert_with(|| blob.clone());
        Ok(())
    }

    async fn blob_exists(&self, digest: &DigestAddress) -> MetadataResult<bool> {
        Ok(self.blobs.lock().await.contains_key(&digest.storage_key()))
    }
}
