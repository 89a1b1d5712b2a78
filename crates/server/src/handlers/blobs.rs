//! Blob read plane handlers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use quarry_core::DigestAddress;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct BlobResponse {
    pub digest_key: String,
    pub hash: String,
    pub size_bytes: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

/// GET /v1/blobs/{digest_key} - Blob metadata lookup.
pub async fn get_blob(
    State(state): State<AppState>,
    Path(digest_key): Path<String>,
) -> ApiResult<Json<BlobResponse>> {
    let digest = parse_digest(&digest_key)?;
    let blob = state.blobs.query(&digest).await?;
    Ok(Json(BlobResponse {
        digest_key,
        hash: blob.digest.hash().to_hex(),
        size_bytes: blob.digest.size_bytes(),
        created_at: blob.created_at,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub offset: u64,
    /// 0 means "to the end of the blob".
    #[serde(default)]
    pub limit: u64,
}

/// GET /v1/blobs/{digest_key}/data?offset=N&limit=M - Stream blob bytes.
pub async fn download_blob(
    State(state): State<AppState>,
    Path(digest_key): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let digest = parse_digest(&digest_key)?;
    let stream = state
        .blobs
        .download(&digest, query.offset, query.limit)
        .await?;

    let remaining = digest.size_bytes() - query.offset;
    let content_length = if query.limit > 0 {
        remaining.min(query.limit)
    } else {
        remaining
    };

    let body_stream = stream.map(|result| {
        result.map(|chunk| chunk.data).map_err(|e| {
            tracing::error!(error = %e, "blob streaming failed mid-transfer");
            std::io::Error::other(e.to_string())
        })
    });

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "application/octet-stream".to_string()),
            (CONTENT_LENGTH, content_length.to_string()),
        ],
        Body::from_stream(body_stream),
    )
        .into_response())
}

fn parse_digest(digest_key: &str) -> ApiResult<DigestAddress> {
    DigestAddress::parse_storage_key(digest_key)
        .map_err(|e| ApiError::BadRequest(format!("invalid digest key: {e}")))
}
