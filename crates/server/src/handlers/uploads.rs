//! Upload control plane handlers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use quarry_core::{SessionToken, UploadStatus};
use serde::{Deserialize, Serialize};

/// Header carrying the session token on append requests.
pub const SESSION_TOKEN_HEADER: &str = "x-quarry-session";

#[derive(Debug, Deserialize)]
pub struct CreateUploadRequest {
    pub upload_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateUploadResponse {
    pub upload_id: String,
    /// Token of this attempt; must be echoed on every append.
    pub session_token: String,
    pub next_offset: u64,
    pub status: UploadStatus,
}

/// POST /v1/uploads - Begin (or re-announce) an upload.
///
/// Each call mints a fresh session token for the caller's attempt. The
/// first attempt's token becomes the one the session tracks; a later
/// attempt re-announcing the same id receives its own token, and its
/// appends will fail the session as a conflicting writer.
pub async fn create_upload(
    State(state): State<AppState>,
    Json(request): Json<CreateUploadRequest>,
) -> ApiResult<(StatusCode, Json<CreateUploadResponse>)> {
    let token = SessionToken::mint();
    let session = state.manager.begin_upload(&request.upload_id, token).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateUploadResponse {
            upload_id: request.upload_id,
            session_token: token.to_string(),
            next_offset: session.next_offset,
            status: session.status,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct AppendQuery {
    pub offset: u64,
}

#[derive(Debug, Serialize)]
pub struct AppendResponse {
    pub upload_id: String,
    pub next_offset: u64,
    pub status: UploadStatus,
}

/// PUT /v1/uploads/{upload_id}/data?offset=N - Append bytes to an upload.
///
/// The raw request body is appended at `offset`, which must equal the
/// session's current `next_offset`. The session token from the begin
/// response is required in the `X-Quarry-Session` header.
pub async fn append_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    Query(query): Query<AppendQuery>,
    req: Request,
) -> ApiResult<Json<AppendResponse>> {
    let token = session_token(req.headers())?;
    // Read the raw body with the configured cap rather than the default
    // extractor limit; oversized payloads are rejected here and the exact
    // size check happens again in the engine.
    let max_body = state.config.server.max_append_size as usize;
    let body = axum::body::to_bytes(req.into_body(), max_body)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    let session = state
        .manager
        .append(&upload_id, token, query.offset, body)
        .await?;

    Ok(Json(AppendResponse {
        upload_id,
        next_offset: session.next_offset,
        status: session.status,
    }))
}

#[derive(Debug, Serialize)]
pub struct UploadStateResponse {
    pub upload_id: String,
    pub next_offset: u64,
    pub status: UploadStatus,
}

/// GET /v1/uploads/{upload_id} - Query upload progress.
pub async fn get_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadStateResponse>> {
    let session = state.manager.get_upload(&upload_id).await?;
    Ok(Json(UploadStateResponse {
        upload_id,
        next_offset: session.next_offset,
        status: session.status,
    }))
}

#[derive(Debug, Serialize)]
pub struct CompleteUploadResponse {
    pub upload_id: String,
    pub digest_key: String,
    pub hash: String,
    pub size_bytes: u64,
}

/// POST /v1/uploads/{upload_id}/complete - Finalize an upload into a blob.
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<CompleteUploadResponse>> {
    let blob = state.manager.complete_upload(&upload_id).await?;
    Ok(Json(CompleteUploadResponse {
        upload_id,
        digest_key: blob.digest.storage_key(),
        hash: blob.digest.hash().to_hex(),
        size_bytes: blob.digest.size_bytes(),
    }))
}

fn session_token(headers: &HeaderMap) -> ApiResult<SessionToken> {
    let value = headers
        .get(SESSION_TOKEN_HEADER)
        .ok_or_else(|| ApiError::BadRequest("missing X-Quarry-Session header".to_string()))?;
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("invalid X-Quarry-Session header".to_string()))?;
    SessionToken::parse(value)
        .map_err(|e| ApiError::BadRequest(format!("invalid session token: {e}")))
}
