//! Backend seam for the remote object store.
//!
//! [`ObjectStore`] is the narrow put/head/get/presign surface the gateway
//! needs against a single bucket. The production backend is
//! [`s3::S3ObjectStore`]; tests use an in-memory backend that reproduces the
//! same error surfaces.

#[cfg(test)]
pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::{collections::HashMap, io, time::Duration};
use thiserror::Error;

/// Body of an object being read from the store.
pub type ObjectStream = BoxStream<'static, io::Result<Bytes>>;

/// Error codes that stores use for a missing key.
const NOT_FOUND_CODES: [&str; 2] = ["NotFound", "NoSuchKey"];

/// Free-text marker some stores put in the message instead of a code.
const NOT_FOUND_MESSAGE: &str = "does not exist";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,
    #[error("{0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Classify a store failure from whatever signals the backend exposes.
    ///
    /// Store error surfaces are not fully structured, so a not-found code,
    /// an HTTP 404 and a "does not exist" message all count as not found.
    pub fn classify(code: Option<&str>, status: Option<u16>, message: &str, detail: String) -> Self {
        let by_code = code.is_some_and(|c| NOT_FOUND_CODES.contains(&c));
        let by_status = status == Some(404);
        let by_message = message.to_ascii_lowercase().contains(NOT_FOUND_MESSAGE);
        if by_code || by_status || by_message {
            StoreError::NotFound
        } else {
            StoreError::Backend(detail)
        }
    }

    /// Classify an error raised while a body stream is being read.
    pub fn from_stream_error(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            return StoreError::NotFound;
        }
        let message = err.to_string();
        Self::classify(None, None, &message, message.clone())
    }
}

/// Canned ACLs the gateway writes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannedAcl {
    Private,
}

/// A fully prepared write.
#[derive(Debug, Clone)]
pub struct PutObject {
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
    /// Base64 MD5 of `body`, checked by the store before it commits.
    pub content_md5: String,
    /// User metadata, without any `x-amz-meta-` prefix.
    pub metadata: HashMap<String, String>,
    pub acl: CannedAcl,
}

/// Result of a metadata lookup.
#[derive(Debug, Clone, Default)]
pub struct ObjectHead {
    pub content_type: Option<String>,
    pub content_length: u64,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket this store is bound to.
    fn bucket(&self) -> &str;

    async fn bucket_exists(&self) -> StoreResult<bool>;

    /// Create the bucket. A bucket that already exists is not an error.
    async fn create_bucket(&self) -> StoreResult<()>;

    async fn put_object(&self, object: PutObject) -> StoreResult<()>;

    async fn head_object(&self, key: &str) -> StoreResult<ObjectHead>;

    async fn get_object(&self, key: &str) -> StoreResult<ObjectStream>;

    /// Credential-free, time-limited GET URL for `key`.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> StoreResult<String>;
}
