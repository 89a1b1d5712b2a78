//! Test server harness backed by temp directories and a SQLite store.

use quarry_core::config::{AppConfig, MetadataConfig, ServerConfig, StorageConfig};
use quarry_server::{create_router, AppState};

pub struct TestServer {
    pub router: axum::Router,
    _temp_dir: tempfile::TempDir,
}

impl TestServer {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let config = AppConfig {
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
                max_append_size: 32 * 1024 * 1024,
            },
            storage: StorageConfig {
                staging_dir: temp_dir.path().join("staging"),
                blobs_dir: temp_dir.path().join("blobs"),
            },
            metadata: MetadataConfig::Sqlite {
                path: temp_dir.path().join("metadata.db"),
            },
        };

        let state = AppState::init(config).await.expect("init state");
        let router = create_router(state);
        Self {
            router,
            _temp_dir: temp_dir,
        }
    }
}
