//! On-disk layout: staging files and content-addressed blob files.

use crate::error::{StoreError, StoreResult};
use quarry_core::config::StorageConfig;
use quarry_core::DigestAddress;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Resolved directory layout for the store.
///
/// Staging paths are derived deterministically from the upload id and
/// committed blob paths from the digest's storage key, so the same upload
/// or content always maps to the same path.
#[derive(Clone, Debug)]
pub struct StoreLayout {
    staging_dir: PathBuf,
    blobs_dir: PathBuf,
}

impl StoreLayout {
    /// Build the layout and create both directories.
    pub async fn init(config: &StorageConfig) -> StoreResult<Self> {
        fs::create_dir_all(&config.staging_dir).await?;
        fs::create_dir_all(&config.blobs_dir).await?;
        Ok(Self {
            staging_dir: config.staging_dir.clone(),
            blobs_dir: config.blobs_dir.clone(),
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn blobs_dir(&self) -> &Path {
        &self.blobs_dir
    }

    /// Staging file path for an upload id.
    pub fn staging_path(&self, upload_id: &str) -> StoreResult<PathBuf> {
        validate_upload_id(upload_id)?;
        Ok(self.staging_dir.join(upload_id))
    }

    /// Committed file path for a digest.
    pub fn blob_path(&self, digest: &DigestAddress) -> PathBuf {
        self.blobs_dir.join(digest.storage_key())
    }
}

/// Reject ids that are blank or would escape the staging directory.
///
/// An upload id becomes a file name, so it must be a single normal path
/// component with no separators or traversal sequences.
pub fn validate_upload_id(upload_id: &str) -> StoreResult<()> {
    if upload_id.trim().is_empty() {
        return Err(StoreError::InvalidInput("upload id is blank".to_string()));
    }
    if upload_id.contains('/') || upload_id.contains('\\') || upload_id.contains("..") {
        return Err(StoreError::InvalidInput(format!(
            "upload id contains unsafe path characters: {upload_id}"
        )));
    }
    let mut components = Path::new(upload_id).components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(_)), None) => Ok(()),
        _ => Err(StoreError::InvalidInput(format!(
            "upload id is not a valid file name: {upload_id}"
        ))),
    }
}
