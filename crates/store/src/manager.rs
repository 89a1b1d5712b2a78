//! The resumable upload session state machine.

use crate::blobs::BlobStore;
use crate::error::{StoreError, StoreResult};
use crate::locks::KeyedLocks;
use crate::paths::{validate_upload_id, StoreLayout};
use bytes::Bytes;
use quarry_core::{
    Blob, BlobHasher, DigestAddress, SessionToken, UploadSession, UploadStatus, MAX_APPEND_SIZE,
};
use quarry_metadata::{MetadataStore, UploadSessionRepo};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::instrument;

/// Owns upload session records and the staging files they reference.
///
/// All mutating operations for one upload id are serialized by a keyed
/// async lock, so racing callers observe each other's state transitions
/// instead of both passing the same check. The state machine is
/// `Active -> Finalizing -> Completed` on the happy path and
/// `Active -> Failed` on corruption or a conflicting attempt; no
/// transition leaves a terminal state.
pub struct UploadManager {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<BlobStore>,
    layout: StoreLayout,
    locks: KeyedLocks,
    max_append_size: u64,
}

impl UploadManager {
    pub fn new(
        layout: StoreLayout,
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<BlobStore>,
    ) -> Self {
        Self {
            metadata,
            blobs,
            layout,
            locks: KeyedLocks::new(),
            max_append_size: MAX_APPEND_SIZE,
        }
    }

    /// Override the maximum accepted append payload size.
    pub fn with_max_append_size(mut self, max_append_size: u64) -> Self {
        self.max_append_size = max_append_size;
        self
    }

    /// Start (or re-announce) an upload.
    ///
    /// Creates an Active session with `next_offset = 0` and an empty
    /// staging file if no session exists for the id. Re-announcing a
    /// tracked id is a no-op success; conflicting attempts are only
    /// detected later, when an append presents a token that does not match
    /// the stored one.
    #[instrument(skip(self, token))]
    pub async fn begin_upload(
        &self,
        upload_id: &str,
        token: SessionToken,
    ) -> StoreResult<UploadSession> {
        validate_upload_id(upload_id)?;
        let _guard = self.locks.lock(upload_id).await;
        self.get_or_create(upload_id, token).await
    }

    /// Append `data` at `offset` to an upload.
    ///
    /// The first append for an unknown id implicitly begins the upload.
    /// `offset` must equal the session's `next_offset` exactly; the staging
    /// file is extended and fsynced before the session record advances, so
    /// `next_offset` never runs ahead of durable bytes.
    #[instrument(skip(self, token, data), fields(len = data.len()))]
    pub async fn append(
        &self,
        upload_id: &str,
        token: SessionToken,
        offset: u64,
        data: Bytes,
    ) -> StoreResult<UploadSession> {
        validate_upload_id(upload_id)?;
        if data.len() as u64 > self.max_append_size {
            return Err(StoreError::InvalidInput(format!(
                "append of {} bytes exceeds maximum {}",
                data.len(),
                self.max_append_size
            )));
        }

        let _guard = self.locks.lock(upload_id).await;
        let mut session = self.get_or_create(upload_id, token).await?;

        // A different token on the same id is a second writer racing on
        // this upload. Fail the session so neither attempt can corrupt it.
        if session.session_token != token {
            self.fail_session(&mut session).await?;
            return Err(StoreError::Corrupt(format!(
                "conflicting upload attempt detected for {upload_id}"
            )));
        }

        if session.status != UploadStatus::Active {
            return Err(StoreError::FailedPrecondition(format!(
                "upload {upload_id} is {}, not active",
                session.status
            )));
        }

        if offset != session.next_offset {
            return Err(StoreError::FailedPrecondition(format!(
                "offset {offset} does not match expected {} for upload {upload_id}",
                session.next_offset
            )));
        }

        let mut hasher = self.resume_hasher(&mut session).await?;
        self.check_staging_length(&mut session).await?;

        hasher.update(&data);
        let staging_path = session.staging_path.clone();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&staging_path)
            .await?;
        file.seek(std::io::SeekFrom::Start(session.next_offset))
            .await?;
        file.write_all(&data).await?;
        // Bytes must be durable before the record advances.
        file.sync_all().await?;

        session.next_offset += data.len() as u64;
        session.hasher_state = Some(hasher.snapshot());
        session.updated_at = OffsetDateTime::now_utc();
        self.metadata.save_session(&session).await?;
        tracing::debug!(next_offset = session.next_offset, "appended to upload");
        Ok(session)
    }

    /// Read-only snapshot of an upload's progress.
    pub async fn get_upload(&self, upload_id: &str) -> StoreResult<UploadSession> {
        validate_upload_id(upload_id)?;
        self.metadata
            .find_session(upload_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("upload {upload_id}")))
    }

    /// Finalize an upload into a content-addressed blob.
    ///
    /// Transitions Active -> Finalizing atomically so the hasher is
    /// finalized at most once even under racing completions; a retry after
    /// a crash mid-commit finds the session Finalizing and converges on the
    /// same blob. Completing an already-Completed upload returns the
    /// existing blob.
    #[instrument(skip(self))]
    pub async fn complete_upload(&self, upload_id: &str) -> StoreResult<Blob> {
        validate_upload_id(upload_id)?;
        let _guard = self.locks.lock(upload_id).await;

        let mut session = match self.metadata.begin_finalize(upload_id).await {
            Ok(session) => session,
            Err(quarry_metadata::MetadataError::NotFound(msg)) => {
                return Err(StoreError::NotFound(msg))
            }
            Err(e) => return Err(e.into()),
        };

        match session.status {
            UploadStatus::Finalizing => {}
            UploadStatus::Completed => {
                // Idempotent retry: rebuild the digest from the persisted
                // hasher snapshot and return the committed blob.
                let digest = self.session_digest(&mut session).await?;
                return self.blobs.query(&digest).await;
            }
            status => {
                return Err(StoreError::FailedPrecondition(format!(
                    "upload {upload_id} is {status}, not completable"
                )));
            }
        }

        let digest = self.session_digest(&mut session).await?;

        // A retry after a crash mid-commit finds the staged file already
        // renamed into place; only run the truncation detector when the
        // content-addressed file is not committed yet.
        if !self.blobs.is_committed(&digest).await? {
            self.check_staging_length(&mut session).await?;
        }

        let blob = self
            .blobs
            .commit(&digest, &session.staging_path)
            .await?;

        session.status = UploadStatus::Completed;
        session.updated_at = OffsetDateTime::now_utc();
        self.metadata.save_session(&session).await?;
        tracing::info!(digest = %digest, "upload completed");
        Ok(blob)
    }

    /// Look up the session, creating a fresh Active one (and its empty
    /// staging file) when none exists.
    async fn get_or_create(
        &self,
        upload_id: &str,
        token: SessionToken,
    ) -> StoreResult<UploadSession> {
        if let Some(session) = self.metadata.find_session(upload_id).await? {
            return Ok(session);
        }
        let staging_path = self.layout.staging_path(upload_id)?;
        fs::File::create(&staging_path).await?;
        let session = UploadSession::new(upload_id.to_string(), token, staging_path);
        self.metadata.save_session(&session).await?;
        tracing::debug!(upload_id, "created upload session");
        Ok(session)
    }

    /// Restore the hasher from the persisted snapshot.
    ///
    /// A missing snapshot with nonzero progress means the record and the
    /// hash state diverged; the session is failed rather than repaired.
    async fn resume_hasher(&self, session: &mut UploadSession) -> StoreResult<BlobHasher> {
        match &session.hasher_state {
            Some(state) => match BlobHasher::restore(state) {
                Ok(hasher) => Ok(hasher),
                Err(e) => {
                    self.fail_session(session).await?;
                    Err(StoreError::Corrupt(format!(
                        "hasher state for upload {} is unreadable: {e}",
                        session.upload_id
                    )))
                }
            },
            None if session.next_offset == 0 => Ok(BlobHasher::new()),
            None => {
                self.fail_session(session).await?;
                Err(StoreError::Corrupt(format!(
                    "upload {} has progress {} but no hasher state",
                    session.upload_id, session.next_offset
                )))
            }
        }
    }

    /// Crash detector: the staging file must hold at least `next_offset`
    /// bytes. A shorter file means prior writes were lost.
    async fn check_staging_length(&self, session: &mut UploadSession) -> StoreResult<()> {
        let len = match fs::metadata(&session.staging_path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if len < session.next_offset {
            self.fail_session(session).await?;
            return Err(StoreError::Corrupt(format!(
                "staging file for upload {} holds {len} bytes, expected at least {}",
                session.upload_id, session.next_offset
            )));
        }
        Ok(())
    }

    /// Finalize a restored copy of the hasher into the session's digest.
    async fn session_digest(&self, session: &mut UploadSession) -> StoreResult<DigestAddress> {
        let hasher = self.resume_hasher(session).await?;
        Ok(DigestAddress::new(hasher.finalize(), session.next_offset))
    }

    async fn fail_session(&self, session: &mut UploadSession) -> StoreResult<()> {
        if !session.status.is_terminal() {
            session.status = UploadStatus::Failed;
            session.updated_at = OffsetDateTime::now_utc();
            self.metadata.save_session(session).await?;
            tracing::warn!(upload_id = %session.upload_id, "upload session failed");
        }
        Ok(())
    }
}
