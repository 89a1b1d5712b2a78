//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted append payload size in bytes.
    #[serde(default = "default_max_append_size")]
    pub max_append_size: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_append_size() -> u64 {
    crate::MAX_APPEND_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_append_size: default_max_append_size(),
        }
    }
}

/// Blob and staging storage configuration.
///
/// Staging and blob directories are explicit configuration rather than
/// process-wide constants; each upload stages under `staging_dir` and
/// committed content-addressed files live under `blobs_dir`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for in-flight upload staging files.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Directory for committed content-addressed blobs.
    #[serde(default = "default_blobs_dir")]
    pub blobs_dir: PathBuf,
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

fn default_blobs_dir() -> PathBuf {
    PathBuf::from("./data/blobs")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            blobs_dir: default_blobs_dir(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.staging_dir == self.blobs_dir {
            return Err("staging_dir and blobs_dir must be distinct".to_string());
        }
        Ok(())
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database file.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// In-memory store; state is lost on restart (testing only).
    Memory,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage directory configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
}
