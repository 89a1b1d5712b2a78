//! Metadata store abstraction and implementations for quarry.
//!
//! This crate provides the control-plane data model:
//! - Upload session records and their state transitions
//! - Finalized blob records keyed by digest
//!
//! The core logic depends only on the narrow find/save/exists repository
//! traits in [`repos`]; SQLite backs production, an in-memory map backs
//! tests.

pub mod error;
pub mod memory;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use memory::MemoryStore;
pub use repos::{BlobRepo, UploadSessionRepo};
pub use store::{MetadataStore, SqliteStore};

use quarry_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        MetadataConfig::Memory => {
            tracing::warn!("using in-memory metadata store; state is lost on restart");
            Ok(Arc::new(MemoryStore::new()) as Arc<dyn MetadataStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("metadata.db");
        let config = MetadataConfig::Sqlite {
            path: db_path.clone(),
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_from_config_memory() {
        let store = from_config(&MetadataConfig::Memory).await.unwrap();
        store.health_check().await.unwrap();
    }
}
