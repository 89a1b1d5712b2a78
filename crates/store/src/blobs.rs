//! Finalized blob storage: atomic commit, query, chunked download.

use crate::error::{StoreError, StoreResult};
use crate::locks::KeyedLocks;
use crate::paths::StoreLayout;
use bytes::Bytes;
use futures::Stream;
use quarry_core::{Blob, DigestAddress, MAX_DOWNLOAD_CHUNK_SIZE};
use quarry_metadata::{BlobRepo, MetadataStore};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::instrument;

/// One chunk of a streamed download.
///
/// `offset` is relative to the start of the read, not absolute within the
/// blob: the first chunk of every download reports offset 0.
#[derive(Clone, Debug)]
pub struct DownloadChunk {
    pub offset: u64,
    pub data: Bytes,
}

/// Lazy, ordered stream of download chunks.
pub type DownloadStream = Pin<Box<dyn Stream<Item = StoreResult<DownloadChunk>> + Send>>;

/// Store of finalized, immutable, content-addressed blobs.
pub struct BlobStore {
    metadata: Arc<dyn MetadataStore>,
    layout: StoreLayout,
    locks: KeyedLocks,
}

impl BlobStore {
    pub fn new(layout: StoreLayout, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            metadata,
            layout,
            locks: KeyedLocks::new(),
        }
    }

    /// Commit a staged file as the blob for `digest`.
    ///
    /// Idempotent: if the content-addressed destination file already exists
    /// the staged file is left untouched and the existing storage wins. The
    /// move is a rename, so concurrent readers never observe a partial file
    /// at the destination. Commits for one digest are serialized by a keyed
    /// lock.
    ///
    /// The staged file is truncated to the addressed size first: a session
    /// resumed after a crash may have rewritten fewer bytes than an earlier
    /// attempt left behind, and trailing stale bytes must not land in the
    /// committed file.
    #[instrument(skip(self, staged_file), fields(digest = %digest))]
    pub async fn commit(&self, digest: &DigestAddress, staged_file: &Path) -> StoreResult<Blob> {
        let _guard = self.locks.lock(&digest.storage_key()).await;

        let dest = self.layout.blob_path(digest);
        if !fs::try_exists(&dest).await? {
            if fs::metadata(staged_file).await?.len() > digest.size_bytes() {
                let staged = fs::OpenOptions::new().write(true).open(staged_file).await?;
                staged.set_len(digest.size_bytes()).await?;
                staged.sync_all().await?;
            }
            fs::rename(staged_file, &dest).await.map_err(|e| {
                StoreError::Io(std::io::Error::new(
                    e.kind(),
                    format!("commit staged file for {digest}: {e}"),
                ))
            })?;
            tracing::debug!(path = %dest.display(), "committed blob file");
        }

        if let Some(existing) = self.metadata.find_blob(digest).await? {
            return Ok(existing);
        }
        let blob = Blob::new(*digest, dest);
        self.metadata.save_blob(&blob).await?;
        Ok(blob)
    }

    /// Check whether the content-addressed file for `digest` is already in
    /// place.
    pub async fn is_committed(&self, digest: &DigestAddress) -> StoreResult<bool> {
        Ok(fs::try_exists(self.layout.blob_path(digest)).await?)
    }

    /// Look up a blob record by digest.
    pub async fn query(&self, digest: &DigestAddress) -> StoreResult<Blob> {
        self.metadata
            .find_blob(digest)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("blob {digest}")))
    }

    /// Stream a blob's bytes starting at `offset`.
    ///
    /// A `limit` of 0 means "to the end of the blob"; otherwise at most
    /// `limit` bytes are read. Chunks are capped at
    /// [`MAX_DOWNLOAD_CHUNK_SIZE`] and the final chunk is truncated to the
    /// exact remaining budget.
    #[instrument(skip(self), fields(digest = %digest))]
    pub async fn download(
        &self,
        digest: &DigestAddress,
        offset: u64,
        limit: u64,
    ) -> StoreResult<DownloadStream> {
        if offset > digest.size_bytes() {
            return Err(StoreError::InvalidInput(format!(
                "offset {offset} is past the end of blob {digest}"
            )));
        }
        if limit > i32::MAX as u64 {
            return Err(StoreError::InvalidInput(format!(
                "limit {limit} exceeds the 32-bit chunk boundary"
            )));
        }

        let blob = self.query(digest).await?;
        let remaining = digest.size_bytes() - offset;
        let bytes_to_read = if limit > 0 {
            remaining.min(limit)
        } else {
            remaining
        };

        let mut file = fs::File::open(&blob.location).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::Corrupt(format!("blob file missing for {digest}"))
            } else {
                StoreError::Io(e)
            }
        })?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;

        let stream = async_stream::try_stream! {
            let mut budget = bytes_to_read;
            let mut chunk_offset = 0u64;
            while budget > 0 {
                let want = budget.min(MAX_DOWNLOAD_CHUNK_SIZE) as usize;
                let mut buf = vec![0u8; want];
                file.read_exact(&mut buf).await.map_err(|e| {
                    StoreError::Io(std::io::Error::new(
                        e.kind(),
                        format!("read blob at chunk offset {chunk_offset}: {e}"),
                    ))
                })?;
                budget -= want as u64;
                let data = Bytes::from(buf);
                yield DownloadChunk { offset: chunk_offset, data };
                chunk_offset += want as u64;
            }
        };

        Ok(Box::pin(stream))
    }
}
