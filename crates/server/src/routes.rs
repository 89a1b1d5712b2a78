//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (intentionally unauthenticated for load balancers/probes)
        .route("/v1/health", get(handlers::health_check))
        // Upload control plane
        .route("/v1/uploads", post(handlers::create_upload))
        .route("/v1/uploads/{upload_id}", get(handlers::get_upload))
        .route("/v1/uploads/{upload_id}/data", put(handlers::append_upload))
        .route(
            "/v1/uploads/{upload_id}/complete",
            post(handlers::complete_upload),
        )
        // Blob read plane
        .route("/v1/blobs/{digest_key}", get(handlers::get_blob))
        .route("/v1/blobs/{digest_key}/data", get(handlers::download_blob))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
