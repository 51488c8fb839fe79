//! HTTP router and shared application state.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::access::AccessPolicy;
use crate::fs::FsService;
use crate::fs_handlers::{
    self, MAX_PATH_REQUEST_BODY_BYTES, MAX_WORKSPACE_REQUEST_BODY_BYTES,
    MAX_WRITE_REQUEST_BODY_BYTES,
};
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub fs: Arc<FsService>,
    pub policy: Arc<AccessPolicy>,
    /// Fired at server shutdown; in-flight filesystem operations observe it
    /// and abort at their next I/O boundary.
    pub shutdown: CancellationToken,
}

/// Exact-path routes for the control plane. Mutating filesystem endpoints
/// carry per-route transport body caps; anything else on these paths is a
/// 404/405 from the router itself.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/global/health", get(health))
        .route("/v1/terminals/auth", get(ws::terminal_auth))
        .route("/v1/terminals/ws", get(ws::terminal_ws))
        .route("/v1/fs/stat", get(fs_handlers::stat))
        .route("/v1/fs/list", get(fs_handlers::list))
        .route("/v1/fs/read", get(fs_handlers::read))
        .route(
            "/v1/fs/write",
            post(fs_handlers::write).layer(DefaultBodyLimit::max(MAX_WRITE_REQUEST_BODY_BYTES)),
        )
        .route(
            "/v1/fs/create",
            post(fs_handlers::create).layer(DefaultBodyLimit::max(MAX_PATH_REQUEST_BODY_BYTES)),
        )
        .route(
            "/v1/fs/delete",
            post(fs_handlers::delete).layer(DefaultBodyLimit::max(MAX_PATH_REQUEST_BODY_BYTES)),
        )
        .route(
            "/v1/workspaces/open",
            post(fs_handlers::workspace_open)
                .layer(DefaultBodyLimit::max(MAX_WORKSPACE_REQUEST_BODY_BYTES)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
