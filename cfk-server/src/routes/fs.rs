//! `/api/fs/*` and `/api/p/*` handlers -- the JSON file-system API.
//!
//! Every handler resolves its virtual path, builds a [`DriverContext`] from
//! the (currently trivial) request context, and forwards into the facade.
//! Authentication and per-key path scoping are left to caller-supplied
//! middleware, consistent with the facade-only interface this crate
//! exposes.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use cfk_core::backend::BatchResult;
use cfk_core::operations::*;
use cfk_core::session::{Fingerprint, UploadSessionInit};
use cfk_core::{CfkError, DirectoryListing, DriverContext, FileEntry, VirtualPath};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn ctx() -> DriverContext {
    DriverContext::background()
}

fn envelope<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": data }))
}

#[derive(Deserialize)]
pub struct ListQuery {
    path: String,
    #[serde(default)]
    refresh: bool,
    #[serde(default)]
    recursive: bool,
}

pub async fn list(State(state): State<AppState>, Query(q): Query<ListQuery>) -> ApiResult<Json<serde_json::Value>> {
    let options = ListOptions { refresh: q.refresh, recursive: q.recursive, ..Default::default() };
    let listing: DirectoryListing = state.fs.list(&VirtualPath::new(&q.path), &options, &ctx()).await?;
    Ok(envelope(listing))
}

#[derive(Deserialize)]
pub struct PathQuery {
    path: String,
}

pub async fn stat(State(state): State<AppState>, Query(q): Query<PathQuery>) -> ApiResult<Json<serde_json::Value>> {
    let entry: FileEntry = state.fs.stat(&VirtualPath::new(&q.path), &ctx()).await?;
    Ok(envelope(entry))
}

pub async fn download(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    stream_download(&state, &VirtualPath::new(&q.path), &headers).await
}

pub async fn proxy(
    State(state): State<AppState>,
    axum::extract::Path(path): axum::extract::Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    stream_download(&state, &VirtualPath::new(format!("/{path}")), &headers).await
}

async fn stream_download(state: &AppState, path: &VirtualPath, headers: &HeaderMap) -> ApiResult<Response> {
    let options = read_options_from_headers(headers);
    let entry = state.fs.stat(path, &ctx()).await?;
    let stream = state.fs.download(path, &options, &ctx()).await?;
    let body = Body::from_stream(stream);

    let mut response = Response::builder().status(if options.range.is_some() { 206 } else { 200 });
    if let Some(mime) = &entry.mimetype {
        response = response.header(axum::http::header::CONTENT_TYPE, mime);
    }
    if let Some(etag) = &entry.etag {
        response = response.header(axum::http::header::ETAG, etag);
    }
    response = response.header(axum::http::header::ACCEPT_RANGES, "bytes");
    Ok(response.body(body).map_err(|e| CfkError::Driver { subcode: "response".into(), message: e.to_string(), details: None })?.into_response())
}

fn read_options_from_headers(headers: &HeaderMap) -> ReadOptions {
    let mut options = ReadOptions::default();
    if let Some(range) = headers.get(axum::http::header::RANGE).and_then(|v| v.to_str().ok()) {
        if let Some(spec) = range.strip_prefix("bytes=") {
            if let Some((start, end)) = spec.split_once('-') {
                if let (Ok(start), Ok(end)) = (start.parse(), end.parse()) {
                    options.range = Some((start, end));
                }
            }
        }
    }
    options.if_none_match = headers
        .get(axum::http::header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    options.if_match = headers.get(axum::http::header::IF_MATCH).and_then(|v| v.to_str().ok()).map(String::from);
    options
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MkdirBody {
    path: String,
}

pub async fn mkdir(State(state): State<AppState>, Json(body): Json<MkdirBody>) -> ApiResult<Json<serde_json::Value>> {
    let entry = state.fs.mkdir(&VirtualPath::new(&body.path), &ctx()).await?;
    Ok(envelope(entry))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameBody {
    old_path: String,
    new_path: String,
}

pub async fn rename(
    State(state): State<AppState>,
    Json(body): Json<RenameBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let entry = state
        .fs
        .rename(&VirtualPath::new(&body.old_path), &VirtualPath::new(&body.new_path), &MoveOptions::default(), &ctx())
        .await?;
    Ok(envelope(entry))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyBody {
    source_path: String,
    target_path: String,
    #[serde(default)]
    skip_existing: bool,
    #[serde(default)]
    overwrite: bool,
}

pub async fn copy(State(state): State<AppState>, Json(body): Json<CopyBody>) -> ApiResult<Json<serde_json::Value>> {
    let options = CopyOptions { skip_existing: body.skip_existing, overwrite: body.overwrite, ..Default::default() };
    let entry = state
        .fs
        .copy(&VirtualPath::new(&body.source_path), &VirtualPath::new(&body.target_path), &options, &ctx())
        .await?;
    Ok(envelope(entry))
}

#[derive(Deserialize)]
pub struct BatchDeleteBody {
    paths: Vec<String>,
}

pub async fn batch_delete(
    State(state): State<AppState>,
    Json(body): Json<BatchDeleteBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let paths: Vec<VirtualPath> = body.paths.iter().map(VirtualPath::new).collect();
    let result: BatchResult = state.fs.batch_remove(&paths, &DeleteOptions::default(), &ctx()).await?;
    let failed: Vec<_> =
        result.failed.iter().map(|(p, err)| json!({ "path": p.to_path_string(), "error": err })).collect();
    Ok(Json(json!({ "success": true, "succeeded": result.succeeded, "failed": failed })))
}

#[derive(Deserialize)]
pub struct UploadQuery {
    path: String,
}

pub async fn upload_direct(
    State(state): State<AppState>,
    Query(q): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Json<serde_json::Value>> {
    let content_length =
        headers.get(axum::http::header::CONTENT_LENGTH).and_then(|v| v.to_str().ok()).and_then(|v| v.parse().ok());
    let content_type =
        headers.get(axum::http::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(String::from);

    let stream = body.into_data_stream().map(|chunk| chunk.map_err(|e| CfkError::Driver {
        subcode: "upload_body".into(),
        message: e.to_string(),
        details: None,
    }));
    let options = WriteOptions { overwrite: true, create_parents: true, content_type, ..Default::default() };
    let entry = state
        .fs
        .upload(&VirtualPath::new(&q.path), Box::pin(stream), content_length, &options, &ctx())
        .await?;
    Ok(envelope(entry))
}

#[derive(Deserialize)]
pub struct LinkQuery {
    path: String,
    #[serde(rename = "expiresIn")]
    expires_in: Option<u64>,
    #[serde(rename = "forceDownload", default)]
    force_download: bool,
    #[serde(rename = "forceProxy", default)]
    force_proxy: bool,
}

pub async fn link(State(state): State<AppState>, Query(q): Query<LinkQuery>) -> ApiResult<Json<serde_json::Value>> {
    let options =
        LinkOptions { expires_in_secs: q.expires_in, force_download: q.force_download, force_proxy: q.force_proxy };
    let outcome = state.fs.generate_link(&VirtualPath::new(&q.path), &options, &ctx()).await?;
    Ok(Json(json!({
        "success": true,
        "data": { "url": outcome.url, "kind": outcome.kind, "expiresIn": outcome.expires_in_secs },
    })))
}

// -- multipart resumable upload endpoints --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartInitBody {
    path: String,
    file_name: String,
    file_size: u64,
    part_size: Option<u64>,
    fingerprint: Option<Fingerprint>,
}

pub async fn multipart_init(
    State(state): State<AppState>,
    Json(body): Json<MultipartInitBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let init = UploadSessionInit {
        user_ref: None,
        user_kind: None,
        file_name: body.file_name,
        file_size: body.file_size,
        mime_type: None,
        part_size: body.part_size,
        fingerprint: body.fingerprint,
    };
    let session = state.fs.multipart_init(&VirtualPath::new(&body.path), init, &ctx()).await?;
    Ok(envelope(session))
}

#[derive(Deserialize)]
pub struct UploadIdQuery {
    upload_id: String,
}

pub async fn multipart_upload_chunk(
    State(state): State<AppState>,
    Query(q): Query<UploadIdQuery>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Json<serde_json::Value>> {
    let content_range = headers
        .get(axum::http::header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
        .ok_or_else(|| CfkError::Validation("missing or malformed Content-Range header".into()))?;

    let stream = body.into_data_stream().map(|chunk| {
        chunk.map_err(|e| CfkError::Driver { subcode: "upload_body".into(), message: e.to_string(), details: None })
    });

    let ack = state.fs.multipart_upload_chunk(&q.upload_id, Box::pin(stream), content_range, &ctx()).await?;
    Ok(Json(json!({ "success": true, "status": if ack.done { "complete" } else { "partial" }, "done": ack.done })))
}

fn parse_content_range(header: &str) -> Option<(u64, u64, u64)> {
    let spec = header.strip_prefix("bytes ")?;
    let (range, total) = spec.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?, total.parse().ok()?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartCompleteBody {
    #[allow(dead_code)]
    path: String,
    upload_id: String,
    #[serde(default)]
    parts: Vec<(u32, String)>,
}

pub async fn multipart_complete(
    State(state): State<AppState>,
    Json(body): Json<MultipartCompleteBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let entry = state.fs.multipart_complete(&body.upload_id, &body.parts, &ctx()).await?;
    Ok(envelope(entry))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartAbortBody {
    #[allow(dead_code)]
    path: String,
    upload_id: String,
}

pub async fn multipart_abort(
    State(state): State<AppState>,
    Json(body): Json<MultipartAbortBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state.fs.multipart_abort(&body.upload_id, &ctx()).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn multipart_list(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let sessions = state.fs.multipart_list(&VirtualPath::new(&q.path))?;
    Ok(envelope(sessions))
}

pub async fn multipart_parts(
    State(state): State<AppState>,
    Query(q): Query<UploadIdQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = state.fs.multipart_probe(&q.upload_id, &ctx()).await?;
    Ok(Json(json!({
        "success": true,
        "data": {
            "bytesUploaded": status.bytes_uploaded,
            "completedParts": status.completed_parts,
            "nextExpectedRanges": status.next_expected_ranges,
            "expired": status.expired,
        },
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartRefreshBody {
    #[allow(dead_code)]
    path: String,
    upload_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    part_numbers: Vec<u32>,
}

pub async fn multipart_refresh_urls(
    State(state): State<AppState>,
    Json(body): Json<MultipartRefreshBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = state.fs.multipart_probe(&body.upload_id, &ctx()).await?;
    Ok(Json(json!({ "success": true, "data": { "nextExpectedRanges": status.next_expected_ranges } })))
}

pub fn not_found() -> ApiResult<Response> {
    Err(ApiError::from(CfkError::NotFound("no such route".into())))
}
