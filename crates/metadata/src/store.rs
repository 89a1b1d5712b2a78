//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{BlobRow, UploadSessionRow};
use crate::repos::{BlobRepo, UploadSessionRepo};
use async_trait::async_trait;
use quarry_core::{Blob, DigestAddress, UploadSession, UploadStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: UploadSessionRepo + BlobRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MetadataError::Config(format!("create db directory: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under server concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UploadSessionRepo for SqliteStore {
    async fn find_session(&self, upload_id: &str) -> MetadataResult<Option<UploadSession>> {
        let row = sqlx::query_as::<_, UploadSessionRow>(
            "SELECT * FROM upload_sessions WHERE upload_id = ?",
        )
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(UploadSessionRow::into_session).transpose()
    }

    async fn save_session(&self, session: &UploadSession) -> MetadataResult<()> {
        let row = UploadSessionRow::from_session(session);
        sqlx::query(
            "INSERT INTO upload_sessions \
             (upload_id, session_token, created_at, updated_at, staging_path, next_offset, hasher_state, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(upload_id) DO UPDATE SET \
             session_token = excluded.session_token, \
             updated_at = excluded.updated_at, \
             staging_path = excluded.staging_path, \
             next_offset = excluded.next_offset, \
             hasher_state = excluded.hasher_state, \
             status = excluded.status",
        )
        .bind(&row.upload_id)
        .bind(row.session_token)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(&row.staging_path)
        .bind(row.next_offset)
        .bind(&row.hasher_state)
        .bind(&row.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn session_exists(&self, upload_id: &str) -> MetadataResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM upload_sessions WHERE upload_id = ?)")
                .bind(upload_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn begin_finalize(&self, upload_id: &str) -> MetadataResult<UploadSession> {
        // Atomically transition Active -> Finalizing. The write acquires
        // SQLite's exclusive lock, so a concurrent finalize of the same
        // session observes the post-transition state.
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UploadSessionRow>(
            "SELECT * FROM upload_sessions WHERE upload_id = ?",
        )
        .bind(upload_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut row) = row else {
            return Err(MetadataError::NotFound(format!(
                "upload session {upload_id}"
            )));
        };

        if row.status == UploadStatus::Active.as_str() {
            let now = OffsetDateTime::now_utc();
            let result = sqlx::query(
                "UPDATE upload_sessions SET status = ?, updated_at = ? \
                 WHERE upload_id = ? AND status = ?",
            )
            .bind(UploadStatus::Finalizing.as_str())
            .bind(now)
            .bind(upload_id)
            .bind(UploadStatus::Active.as_str())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                row.status = UploadStatus::Finalizing.as_str().to_string();
                row.updated_at = now;
            }
        }

        tx.commit().await?;
        row.into_session()
    }
}

#[async_trait]
impl BlobRepo for SqliteStore {
    async fn find_blob(&self, digest: &DigestAddress) -> MetadataResult<Option<Blob>> {
        let row = sqlx::query_as::<_, BlobRow>("SELECT * FROM blobs WHERE digest_key = ?")
            .bind(digest.storage_key())
            .fetch_optional(&self.pool)
            .await?;
        row.map(BlobRow::into_blob).transpose()
    }

    async fn save_blob(&self, blob: &Blob) -> MetadataResult<()> {
        let row = BlobRow::from_blob(blob);
        sqlx::query(
            "INSERT INTO blobs (digest_key, hash, size_bytes, created_at, location) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(digest_key) DO NOTHING",
        )
        .bind(&row.digest_key)
        .bind(&row.hash)
        .bind(row.size_bytes)
        .bind(row.created_at)
        .bind(&row.location)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn blob_exists(&self, digest: &DigestAddress) -> MetadataResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM blobs WHERE digest_key = ?)")
                .bind(digest.storage_key())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS upload_sessions (
    upload_id     TEXT PRIMARY KEY,
    session_token BLOB NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    staging_path  TEXT NOT NULL,
    next_offset   INTEGER NOT NULL DEFAULT 0,
    hasher_state  BLOB,
    status        TEXT NOT NULL DEFAULT 'active'
);

CREATE INDEX IF NOT EXISTS idx_upload_sessions_status ON upload_sessions(status);

CREATE TABLE IF NOT EXISTS blobs (
    digest_key TEXT PRIMARY KEY,
    hash       BLOB NOT NULL,
    size_bytes INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    location   TEXT NOT NULL
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{BlobHasher, ContentHash, SessionToken};
    use std::path::PathBuf;

    async fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("metadata.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_session_save_and_find() {
        let (_dir, store) = test_store().await;

        assert!(store.find_session("missing").await.unwrap().is_none());

        let mut session = UploadSession::new(
            "u1".to_string(),
            SessionToken::mint(),
            PathBuf::from("/tmp/staging/u1"),
        );
        store.save_session(&session).await.unwrap();

        let mut hasher = BlobHasher::new();
        hasher.update(b"bytes");
        session.next_offset = 5;
        session.hasher_state = Some(hasher.snapshot());
        store.save_session(&session).await.unwrap();

        let found = store.find_session("u1").await.unwrap().unwrap();
        assert_eq!(found.next_offset, 5);
        assert_eq!(found.session_token, session.session_token);
        assert_eq!(found.hasher_state, session.hasher_state);
        assert_eq!(found.status, UploadStatus::Active);
    }

    #[tokio::test]
    async fn test_begin_finalize_transitions_once() {
        let (_dir, store) = test_store().await;

        let session = UploadSession::new(
            "u1".to_string(),
            SessionToken::mint(),
            PathBuf::from("/tmp/staging/u1"),
        );
        store.save_session(&session).await.unwrap();

        let first = store.begin_finalize("u1").await.unwrap();
        assert_eq!(first.status, UploadStatus::Finalizing);

        // Second call observes the already-transitioned state unchanged.
        let second = store.begin_finalize("u1").await.unwrap();
        assert_eq!(second.status, UploadStatus::Finalizing);

        assert!(matches!(
            store.begin_finalize("missing").await,
            Err(MetadataError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_begin_finalize_leaves_terminal_states() {
        let (_dir, store) = test_store().await;

        let mut session = UploadSession::new(
            "u1".to_string(),
            SessionToken::mint(),
            PathBuf::from("/tmp/staging/u1"),
        );
        session.status = UploadStatus::Failed;
        store.save_session(&session).await.unwrap();

        let result = store.begin_finalize("u1").await.unwrap();
        assert_eq!(result.status, UploadStatus::Failed);
    }

    #[tokio::test]
    async fn test_blob_save_is_idempotent() {
        let (_dir, store) = test_store().await;

        let digest = DigestAddress::new(ContentHash::compute(b"blob"), 4);
        assert!(store.find_blob(&digest).await.unwrap().is_none());

        let blob = Blob::new(digest, PathBuf::from("/tmp/blobs/a"));
        store.save_blob(&blob).await.unwrap();

        // A second save with a different location keeps the first record.
        let other = Blob::new(digest, PathBuf::from("/tmp/blobs/b"));
        store.save_blob(&other).await.unwrap();

        let found = store.find_blob(&digest).await.unwrap().unwrap();
        assert_eq!(found.location, PathBuf::from("/tmp/blobs/a"));
        assert_eq!(found.digest, digest);
    }
}
