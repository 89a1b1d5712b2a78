//! End-to-end tests of the upload state machine and blob commit.

use bytes::Bytes;
use futures::TryStreamExt;
use quarry_core::config::StorageConfig;
use quarry_core::{ContentHash, DigestAddress, SessionToken, UploadStatus};
use quarry_metadata::{MemoryStore, MetadataStore};
use quarry_store::{BlobStore, StoreError, StoreLayout, UploadManager};
use std::sync::Arc;

struct Harness {
    _dir: tempfile::TempDir,
    metadata: Arc<dyn MetadataStore>,
    layout: StoreLayout,
    blobs: Arc<BlobStore>,
    manager: UploadManager,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        staging_dir: dir.path().join("staging"),
        blobs_dir: dir.path().join("blobs"),
    };
    let layout = StoreLayout::init(&config).await.unwrap();
    let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
    let blobs = Arc::new(BlobStore::new(layout.clone(), metadata.clone()));
    let manager = UploadManager::new(layout.clone(), metadata.clone(), blobs.clone());
    Harness {
        _dir: dir,
        metadata,
        layout,
        blobs,
        manager,
    }
}

#[tokio::test]
async fn test_happy_path_scenario() {
    let h = harness().await;
    let token = SessionToken::mint();

    let session = h.manager.begin_upload("u1", token).await.unwrap();
    assert_eq!(session.status, UploadStatus::Active);
    assert_eq!(session.next_offset, 0);

    let session = h
        .manager
        .append("u1", token, 0, Bytes::from_static(b"hello"))
        .await
        .unwrap();
    assert_eq!(session.next_offset, 5);

    let session = h
        .manager
        .append("u1", token, 5, Bytes::from_static(b"_u1"))
        .await
        .unwrap();
    assert_eq!(session.next_offset, 8);

    let blob = h.manager.complete_upload("u1").await.unwrap();
    let expected = DigestAddress::new(ContentHash::compute(b"hello_u1"), 8);
    assert_eq!(blob.digest, expected);

    let session = h.manager.get_upload("u1").await.unwrap();
    assert_eq!(session.status, UploadStatus::Completed);
    assert_eq!(session.next_offset, 8);

    // The committed bytes stream back out intact.
    let chunks: Vec<_> = h
        .blobs
        .download(&expected, 0, 0)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let joined: Vec<u8> = chunks.iter().flat_map(|c| c.data.to_vec()).collect();
    assert_eq!(joined, b"hello_u1");
}

#[tokio::test]
async fn test_append_implicitly_begins() {
    let h = harness().await;
    let token = SessionToken::mint();

    let session = h
        .manager
        .append("fresh", token, 0, Bytes::from_static(b"abc"))
        .await
        .unwrap();
    assert_eq!(session.next_offset, 3);
    assert_eq!(session.session_token, token);
}

#[tokio::test]
async fn test_offset_mismatch_fails_without_mutation() {
    let h = harness().await;
    let token = SessionToken::mint();

    h.manager
        .append("u1", token, 0, Bytes::from_static(b"abcde"))
        .await
        .unwrap();

    // Gap and overlap are both rejected.
    for bad_offset in [4, 6, 0] {
        let err = h
            .manager
            .append("u1", token, bad_offset, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::FailedPrecondition(_)));
    }

    let session = h.manager.get_upload("u1").await.unwrap();
    assert_eq!(session.next_offset, 5);
    assert_eq!(session.status, UploadStatus::Active);
}

#[tokio::test]
async fn test_truncated_staging_file_fails_session() {
    let h = harness().await;
    let token = SessionToken::mint();

    h.manager
        .append("u1", token, 0, Bytes::from_static(b"0123456789"))
        .await
        .unwrap();

    // Shrink the staging file out-of-band, simulating lost writes.
    let staging = h.layout.staging_path("u1").unwrap();
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&staging)
        .unwrap();
    file.set_len(4).unwrap();
    drop(file);

    let err = h
        .manager
        .append("u1", token, 10, Bytes::from_static(b"more"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));

    let session = h.manager.get_upload("u1").await.unwrap();
    assert_eq!(session.status, UploadStatus::Failed);

    // A failed session cannot be completed.
    let err = h.manager.complete_upload("u1").await.unwrap_err();
    assert!(matches!(err, StoreError::FailedPrecondition(_)));
}

#[tokio::test]
async fn test_truncation_detected_at_complete() {
    let h = harness().await;
    let token = SessionToken::mint();

    h.manager
        .append("u1", token, 0, Bytes::from_static(b"0123456789"))
        .await
        .unwrap();

    let staging = h.layout.staging_path("u1").unwrap();
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&staging)
        .unwrap();
    file.set_len(4).unwrap();
    drop(file);

    let err = h.manager.complete_upload("u1").await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
    let session = h.manager.get_upload("u1").await.unwrap();
    assert_eq!(session.status, UploadStatus::Failed);
}

#[tokio::test]
async fn test_conflicting_attempt_fails_session() {
    let h = harness().await;
    let first = SessionToken::mint();
    let second = SessionToken::mint();

    h.manager.begin_upload("u2", first).await.unwrap();
    // Re-announcing the id is a no-op success, even for another attempt.
    h.manager.begin_upload("u2", second).await.unwrap();

    h.manager
        .append("u2", first, 0, Bytes::from_static(b"one"))
        .await
        .unwrap();

    // The second attempt's append presents a token that does not match the
    // tracked session: fatal conflict, session Failed.
    let err = h
        .manager
        .append("u2", second, 3, Bytes::from_static(b"two"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));

    let session = h.manager.get_upload("u2").await.unwrap();
    assert_eq!(session.status, UploadStatus::Failed);

    // The first attempt is also dead now.
    let err = h
        .manager
        .append("u2", first, 3, Bytes::from_static(b"two"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::FailedPrecondition(_)));
}

#[tokio::test]
async fn test_completion_is_idempotent() {
    let h = harness().await;
    let token = SessionToken::mint();

    h.manager
        .append("u1", token, 0, Bytes::from_static(b"content"))
        .await
        .unwrap();

    let first = h.manager.complete_upload("u1").await.unwrap();
    let second = h.manager.complete_upload("u1").await.unwrap();
    assert_eq!(first.digest, second.digest);
    assert_eq!(first.location, second.location);

    // A second upload of the same content dedups onto the same blob.
    let other = SessionToken::mint();
    h.manager
        .append("u9", other, 0, Bytes::from_static(b"content"))
        .await
        .unwrap();
    let third = h.manager.complete_upload("u9").await.unwrap();
    assert_eq!(third.digest, first.digest);
    assert_eq!(third.location, first.location);

    // Exactly one committed file.
    let entries = std::fs::read_dir(h.layout.blobs_dir()).unwrap().count();
    assert_eq!(entries, 1);
}

#[tokio::test]
async fn test_retry_after_crash_mid_commit() {
    let h = harness().await;
    let token = SessionToken::mint();

    h.manager
        .append("u1", token, 0, Bytes::from_static(b"crashy"))
        .await
        .unwrap();

    // Simulate a crash after the rename but before the session record was
    // marked Completed: move the staged file into place by hand.
    let digest = DigestAddress::new(ContentHash::compute(b"crashy"), 6);
    let staging = h.layout.staging_path("u1").unwrap();
    std::fs::rename(&staging, h.layout.blob_path(&digest)).unwrap();

    let blob = h.manager.complete_upload("u1").await.unwrap();
    assert_eq!(blob.digest, digest);
    let session = h.manager.get_upload("u1").await.unwrap();
    assert_eq!(session.status, UploadStatus::Completed);
}

#[tokio::test]
async fn test_append_after_complete_rejected() {
    let h = harness().await;
    let token = SessionToken::mint();

    h.manager
        .append("u1", token, 0, Bytes::from_static(b"done"))
        .await
        .unwrap();
    h.manager.complete_upload("u1").await.unwrap();

    let err = h
        .manager
        .append("u1", token, 4, Bytes::from_static(b"late"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::FailedPrecondition(_)));
}

#[tokio::test]
async fn test_resume_across_manager_restart() {
    let h = harness().await;
    let token = SessionToken::mint();

    h.manager
        .append("u1", token, 0, Bytes::from_static(b"first half "))
        .await
        .unwrap();

    // A new manager over the same metadata and directories picks up the
    // persisted session and hasher snapshot.
    let blobs = Arc::new(BlobStore::new(h.layout.clone(), h.metadata.clone()));
    let manager = UploadManager::new(h.layout.clone(), h.metadata.clone(), blobs);

    manager
        .append("u1", token, 11, Bytes::from_static(b"second half"))
        .await
        .unwrap();
    let blob = manager.complete_upload("u1").await.unwrap();

    let expected = DigestAddress::new(
        ContentHash::compute(b"first half second half"),
        22,
    );
    assert_eq!(blob.digest, expected);
}

#[tokio::test]
async fn test_empty_upload_completes() {
    let h = harness().await;
    let token = SessionToken::mint();

    h.manager.begin_upload("empty", token).await.unwrap();
    let blob = h.manager.complete_upload("empty").await.unwrap();
    assert_eq!(blob.digest, DigestAddress::new(ContentHash::compute(b""), 0));
}

#[tokio::test]
async fn test_unknown_upload_not_found() {
    let h = harness().await;
    assert!(matches!(
        h.manager.get_upload("ghost").await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        h.manager.complete_upload("ghost").await,
        Err(StoreError::NotFound(_))
    ));
}
