//! HTTP handlers for file upload and retrieval.
//!
//! Uploads go through the validation pipeline and key generator before
//! reaching the gateway. Reads go straight to the gateway, which
//! re-sanitizes the key taken from the path.

use crate::{
    errors::AppError,
    models::{
        object::StoredObjectMetadata,
        upload::{UploadCandidate, UploadReceipt},
    },
    services::{
        identity::Principal,
        key_generator,
        storage_gateway::COMPONENT,
        upload_validator::{ValidationError, validate},
    },
    state::AppState,
};
use axum::{
    Extension, Json,
    body::Body,
    extract::{Multipart, Path, Query, State, multipart::Field},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::BytesMut;
use chrono::Utc;
use percent_encoding::utf8_percent_encode;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Multipart form field carrying the file.
pub const FILE_FIELD: &str = "file";

/// Longest filename placed in a Content-Disposition header.
const MAX_HEADER_FILENAME_CHARS: usize = 255;

#[derive(Debug, Deserialize)]
pub struct PresignQuery {
    /// Lifetime in seconds; the configured default when absent.
    pub expires: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    pub url: String,
    pub expires_in: u64,
}

/// `POST /files/upload`: multipart upload of a single `file` field.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>, AppError> {
    let mut candidate = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            candidate = Some(read_file_field(field, state.policy.max_bytes).await?);
            break;
        }
    }

    validate(candidate.as_ref(), &state.policy)?;
    let Some(UploadCandidate {
        original_name,
        mime_type,
        size_bytes,
        content,
    }) = candidate
    else {
        return Err(ValidationError::MissingFile.into());
    };

    let key = key_generator::generate(&original_name);
    let stored = state
        .gateway
        .put(key.as_str(), content, &mime_type, &original_name)
        .await?;

    info!(
        user = %principal.id,
        key = %stored,
        size = size_bytes,
        mime_type = %mime_type,
        "file uploaded"
    );

    Ok(Json(UploadReceipt {
        key: stored.into_inner(),
        original_name,
        size: size_bytes,
        mime_type,
        uploaded_at: Utc::now(),
    }))
}

/// Read the file field, giving up as soon as it grows past `max_bytes`.
async fn read_file_field(mut field: Field<'_>, max_bytes: u64) -> Result<UploadCandidate, AppError> {
    let original_name = field
        .file_name()
        .map(str::to_owned)
        .ok_or(ValidationError::MissingFile)?;
    let mime_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_owned();

    let mut buffer = BytesMut::new();
    while let Some(chunk) = field.chunk().await? {
        if (buffer.len() + chunk.len()) as u64 > max_bytes {
            return Err(ValidationError::TooLarge { max_bytes }.into());
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(UploadCandidate::new(original_name, mime_type, buffer.freeze()))
}

/// `GET /files/{key}/info`: stored metadata as JSON.
pub async fn file_info(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<StoredObjectMetadata>, AppError> {
    Ok(Json(state.gateway.stat(&key).await?))
}

/// `GET /files/{key}`: whole object, displayed inline.
pub async fn get_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let bytes = state.gateway.get_buffer(&key).await?;
    let meta = state.gateway.stat(&key).await?;

    let length = bytes.len() as u64;
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &meta, length, "inline");
    Ok(response)
}

/// `GET /files/{key}/download`: object streamed as an attachment.
pub async fn download_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let meta = state.gateway.stat(&key).await?;
    let stream = state.gateway.get_stream(&key).await?;

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &meta, meta.size_bytes, "attachment");
    Ok(response)
}

/// `GET /files/{key}/url?expires=<secs>`: presigned download URL.
pub async fn presign_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<PresignQuery>,
) -> Result<Json<PresignResponse>, AppError> {
    let expires_in = query.expires.unwrap_or(state.default_presign_expiry_secs);
    let url = state.gateway.presign(&key, expires_in).await?;
    Ok(Json(PresignResponse { url, expires_in }))
}

/// Filename safe for a quoted header parameter: control characters
/// (including CR and LF) and double quotes removed, at most 255 characters.
pub fn header_safe_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control() && *c != '"')
        .take(MAX_HEADER_FILENAME_CHARS)
        .collect()
}

fn content_disposition(disposition: &'static str, name: &str) -> HeaderValue {
    let encoded = utf8_percent_encode(name, COMPONENT);
    let full = format!("{disposition}; filename=\"{name}\"; filename*=UTF-8''{encoded}");
    HeaderValue::from_bytes(full.as_bytes())
        .or_else(|_| HeaderValue::from_str(&format!("{disposition}; filename*=UTF-8''{encoded}")))
        .unwrap_or_else(|_| HeaderValue::from_static(disposition))
}

fn set_file_headers(
    headers: &mut HeaderMap,
    meta: &StoredObjectMetadata,
    length: u64,
    disposition: &'static str,
) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    let mut filename = header_safe_filename(&meta.original_name);
    if filename.trim().is_empty() {
        filename = meta.key.clone();
    }
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(disposition, &filename),
    );

    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{etag}\"")) {
            headers.insert(header::ETAG, value);
        }
    }
    if let Some(last_modified) = meta.last_modified {
        if let Ok(value) = HeaderValue::from_str(&last_modified.to_rfc2822()) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
}
