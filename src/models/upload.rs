//! Transient upload payloads and the response returned once they are stored.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A file received from a client, before any policy has been applied.
///
/// Every field is untrusted. The candidate lives for one request and is
/// never persisted as-is.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    /// Filename exactly as the client sent it.
    pub original_name: String,

    /// MIME type declared by the client.
    pub mime_type: String,

    /// Payload size in bytes.
    pub size_bytes: u64,

    /// Payload bytes.
    pub content: Bytes,
}

impl UploadCandidate {
    pub fn new(original_name: impl Into<String>, mime_type: impl Into<String>, content: Bytes) -> Self {
        Self {
            original_name: original_name.into(),
            mime_type: mime_type.into(),
            size_bytes: content.len() as u64,
            content,
        }
    }
}

/// Body of a successful upload response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    /// Storage key assigned to the object.
    pub key: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}
