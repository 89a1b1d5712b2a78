//! HTTP API server for the quarry blob store.
//!
//! This crate provides the HTTP boundary over the upload engine:
//! - Upload session management (begin, append, query, complete)
//! - Blob metadata lookup and streamed download
//! - Error-to-status mapping and request tracing

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
