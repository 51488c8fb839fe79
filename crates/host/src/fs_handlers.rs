//! Filesystem RPC handlers.
//!
//! Every endpoint runs the access gate, decodes its arguments strictly
//! (unknown fields rejected, exactly one JSON document, transport-capped
//! body), invokes the filesystem service, and maps service errors onto the
//! wire. Errors are plaintext; successes are JSON.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::fs::{FsError, ListEntry, ReadResult, StatResult};

/// Transport-level body caps, enforced per route before decoding.
pub(crate) const MAX_WRITE_REQUEST_BODY_BYTES: usize = 6 * 1024 * 1024;
pub(crate) const MAX_PATH_REQUEST_BODY_BYTES: usize = 128 * 1024;
pub(crate) const MAX_WORKSPACE_REQUEST_BODY_BYTES: usize = 256 * 1024;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Deserialize)]
pub(crate) struct PathQuery {
    #[serde(default)]
    path: String,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenQuery {
    #[serde(default)]
    pub(crate) token: Option<String>,
}

#[derive(Debug, Serialize)]
struct FsStatResponse {
    path: String,
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(rename = "isDir")]
    is_dir: bool,
    #[serde(rename = "modTime", skip_serializing_if = "Option::is_none")]
    mod_time: Option<DateTime<Utc>>,
}

impl From<StatResult> for FsStatResponse {
    fn from(stat: StatResult) -> Self {
        Self {
            path: stat.path.to_string_lossy().into_owned(),
            exists: stat.exists,
            size: stat.exists.then_some(stat.size),
            is_dir: stat.is_dir,
            mod_time: stat.modified.map(DateTime::<Utc>::from),
        }
    }
}

#[derive(Debug, Serialize)]
struct FsListEntryResponse {
    name: String,
    path: String,
    #[serde(rename = "isDir")]
    is_dir: bool,
    size: u64,
}

impl From<ListEntry> for FsListEntryResponse {
    fn from(entry: ListEntry) -> Self {
        Self {
            name: entry.name,
            path: entry.path.to_string_lossy().into_owned(),
            is_dir: entry.is_dir,
            size: entry.size,
        }
    }
}

#[derive(Debug, Serialize)]
struct FsReadResponse {
    path: String,
    size: u64,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteRequest {
    #[serde(default)]
    path: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateRequest {
    #[serde(default)]
    path: String,
    #[serde(rename = "isDir", default)]
    is_dir: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteRequest {
    #[serde(default)]
    path: String,
    #[serde(default)]
    recursive: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkspaceOpenRequest {
    #[serde(default)]
    paths: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WorkspaceOpenResponse {
    paths: Vec<FsStatResponse>,
}

pub(crate) async fn stat(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> Response {
    if let Err(denied) =
        state
            .policy
            .require_access(remote.ip(), &headers, query.token.as_deref(), "fs stat")
    {
        return denied.into_response();
    }

    match state.fs.stat(&state.shutdown, &query.path).await {
        Ok(stat) => json_response(&FsStatResponse::from(stat)),
        Err(err) => fs_error_response(&err),
    }
}

pub(crate) async fn list(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> Response {
    if let Err(denied) =
        state
            .policy
            .require_access(remote.ip(), &headers, query.token.as_deref(), "fs list")
    {
        return denied.into_response();
    }

    match state.fs.list(&state.shutdown, &query.path).await {
        Ok(entries) => {
            let out: Vec<FsListEntryResponse> =
                entries.into_iter().map(FsListEntryResponse::from).collect();
            json_response(&out)
        }
        Err(err) => fs_error_response(&err),
    }
}

pub(crate) async fn read(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> Response {
    if let Err(denied) =
        state
            .policy
            .require_access(remote.ip(), &headers, query.token.as_deref(), "fs read")
    {
        return denied.into_response();
    }

    match state.fs.read_text(&state.shutdown, &query.path).await {
        Ok(ReadResult { path, size, content }) => json_response(&FsReadResponse {
            path: path.to_string_lossy().into_owned(),
            size,
            content,
        }),
        Err(err) => fs_error_response(&err),
    }
}

pub(crate) async fn write(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Response {
    if let Err(denied) =
        state
            .policy
            .require_access(remote.ip(), &headers, query.token.as_deref(), "fs write")
    {
        return denied.into_response();
    }

    let req: WriteRequest = match decode_json_body(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };

    match state
        .fs
        .write_text(&state.shutdown, &req.path, req.content)
        .await
    {
        Ok(stat) => json_response(&FsStatResponse::from(stat)),
        Err(err) => fs_error_response(&err),
    }
}

pub(crate) async fn create(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Response {
    if let Err(denied) =
        state
            .policy
            .require_access(remote.ip(), &headers, query.token.as_deref(), "fs create")
    {
        return denied.into_response();
    }

    let req: CreateRequest = match decode_json_body(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };

    match state.fs.create(&state.shutdown, &req.path, req.is_dir).await {
        Ok(stat) => json_response(&FsStatResponse::from(stat)),
        Err(err) => fs_error_response(&err),
    }
}

pub(crate) async fn delete(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Response {
    if let Err(denied) =
        state
            .policy
            .require_access(remote.ip(), &headers, query.token.as_deref(), "fs delete")
    {
        return denied.into_response();
    }

    let req: DeleteRequest = match decode_json_body(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };

    match state
        .fs
        .delete(&state.shutdown, &req.path, req.recursive)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => fs_error_response(&err),
    }
}

pub(crate) async fn workspace_open(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Response {
    if let Err(denied) = state.policy.require_access(
        remote.ip(),
        &headers,
        query.token.as_deref(),
        "workspace open",
    ) {
        return denied.into_response();
    }

    let req: WorkspaceOpenRequest = match decode_json_body(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };

    match state.fs.workspace_open(&state.shutdown, req.paths).await {
        Ok(stats) => json_response(&WorkspaceOpenResponse {
            paths: stats.into_iter().map(FsStatResponse::from).collect(),
        }),
        Err(err) => fs_error_response(&err),
    }
}

/// Strict decode: `deny_unknown_fields` on the request structs rejects
/// unexpected keys, and `serde_json::from_slice` refuses trailing bytes, so
/// exactly one document is accepted.
fn decode_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body)
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid request body").into_response())
}

fn json_response<T: Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode filesystem response");
            (StatusCode::INTERNAL_SERVER_ERROR, "filesystem operation failed").into_response()
        }
    }
}

fn fs_error_response(err: &FsError) -> Response {
    let (status, message) = match err {
        FsError::PathRequired | FsError::InvalidPath => (StatusCode::BAD_REQUEST, "invalid path"),
        FsError::PathNotFound => (StatusCode::NOT_FOUND, "path does not exist"),
        FsError::PathNotDirectory => (StatusCode::BAD_REQUEST, "path is not a directory"),
        FsError::PathIsDirectory => (StatusCode::BAD_REQUEST, "path is a directory"),
        FsError::DirectoryNeedsRecursive => {
            (StatusCode::CONFLICT, "directory delete requires recursive=true")
        }
        FsError::FileTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "file too large to read"),
        FsError::ContentTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "content too large"),
        FsError::BinaryFile | FsError::UnsupportedFileType => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported file type")
        }
        FsError::RefuseFilesystemRoot => {
            (StatusCode::BAD_REQUEST, "refusing to mutate filesystem root")
        }
        FsError::FileAlreadyExists => (StatusCode::CONFLICT, "file already exists"),
        FsError::NoWorkspacePaths => (StatusCode::BAD_REQUEST, "no paths provided"),
        FsError::TooManyWorkspacePaths => (StatusCode::BAD_REQUEST, "too many paths provided"),
        FsError::Canceled => (StatusCode::REQUEST_TIMEOUT, "request canceled"),
        FsError::Io(io_err) => {
            tracing::error!(error = %io_err, "filesystem operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "filesystem operation failed")
        }
    };
    (status, message).into_response()
}
