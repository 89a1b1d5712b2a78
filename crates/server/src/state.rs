//! Application state shared across handlers.

use anyhow::{Context, Result};
use quarry_core::config::AppConfig;
use quarry_metadata::MetadataStore;
use quarry_store::{BlobStore, StoreLayout, UploadManager};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub metadata: Arc<dyn MetadataStore>,
    pub manager: Arc<UploadManager>,
    pub blobs: Arc<BlobStore>,
}

impl AppState {
    /// Wire up metadata, layout, and the engine from configuration.
    pub async fn init(config: AppConfig) -> Result<Self> {
        config
            .storage
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid storage configuration: {e}"))?;

        let metadata = quarry_metadata::from_config(&config.metadata)
            .await
            .context("failed to initialize metadata store")?;

        let layout = StoreLayout::init(&config.storage)
            .await
            .context("failed to initialize storage directories")?;

        let blobs = Arc::new(BlobStore::new(layout.clone(), metadata.clone()));
        let manager = Arc::new(
            UploadManager::new(layout, metadata.clone(), blobs.clone())
                .with_max_append_size(config.server.max_append_size),
        );

        Ok(Self {
            config: Arc::new(config),
            metadata,
            manager,
            blobs,
        })
    }
}
