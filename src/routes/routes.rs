//! Defines routes for file intake and retrieval.
//!
//! ## Structure
//! - **Probes** (public)
//!   - `GET  /healthz`  liveness
//!   - `GET  /readyz`   bucket reachability
//!
//! - **File endpoints** (bearer token required)
//!   - `POST /files/upload`          multipart upload, field `file`
//!   - `GET  /files/{key}`           inline content
//!   - `GET  /files/{key}/info`      metadata as JSON
//!   - `GET  /files/{key}/download`  streamed attachment
//!   - `GET  /files/{key}/url`       presigned URL (`?expires=<secs>`)

use crate::{
    handlers::{
        file_handlers::{download_file, file_info, get_file, presign_file, upload_file},
        health_handlers::{healthz, readyz},
    },
    middleware::auth::require_auth,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Build the application router with its shared state attached.
pub fn routes(state: AppState) -> Router {
    let body_limit = usize::try_from(state.policy.max_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES))
        .unwrap_or(usize::MAX);

    let files = Router::new()
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/{key}", get(get_file))
        .route("/{key}/info", get(file_info))
        .route("/{key}/download", get(download_file))
        .route("/{key}/url", get(presign_file))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/files", files)
        .with_state(state)
}
