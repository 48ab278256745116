//! src/services/storage_gateway.rs
//!
//! StorageGateway: sole owner of all traffic to the remote object store for
//! one bucket. Every operation re-sanitizes the key it is given, so the
//! gateway is safe to call directly and not only from the upload path.
//! Object metadata is read from the store on each call; nothing is cached.

use crate::{
    models::object::{StoredObjectKey, StoredObjectMetadata},
    services::{
        object_store::{CannedAcl, ObjectStore, ObjectStream, PutObject, StoreError},
        sanitizer::{InvalidName, sanitize},
        upload_validator::mime_for_name,
    },
};
use base64::{Engine as _, engine::general_purpose};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, info};

/// User metadata entry holding the percent-encoded client filename.
pub const ORIGINAL_NAME_METADATA: &str = "original-name";

/// Longest presigned URL lifetime: 24 hours.
pub const MAX_PRESIGN_EXPIRY_SECS: u64 = 24 * 60 * 60;

/// Characters left unescaped by `encodeURIComponent`; everything else is
/// percent-encoded so the value survives header and metadata transport.
pub const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid object key")]
    InvalidName(#[from] InvalidName),
    #[error("expiry must be between 1 and {MAX_PRESIGN_EXPIRY_SECS} seconds, got {0}")]
    InvalidExpiry(u64),
    #[error("file not found")]
    NotFound,
    #[error("failed to store file: {0}")]
    WriteFailed(String),
    #[error("failed to look up file: {0}")]
    LookupFailed(String),
    #[error("failed to sign download URL: {0}")]
    SignFailed(String),
    #[error("failed to provision bucket `{bucket}`: {reason}")]
    BucketUnavailable { bucket: String, reason: String },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Map a store error onto the gateway taxonomy, keeping not-found distinct.
fn map_store_error(err: StoreError, wrap: fn(String) -> GatewayError) -> GatewayError {
    match err {
        StoreError::NotFound => GatewayError::NotFound,
        StoreError::Backend(reason) => wrap(reason),
    }
}

pub fn encode_original_name(name: &str) -> String {
    utf8_percent_encode(name, COMPONENT).to_string()
}

/// Decode a stored filename, falling back to the raw value when it is not
/// valid percent-encoded UTF-8.
pub fn decode_original_name(encoded: &str) -> String {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| encoded.to_string())
}

/// StorageGateway wraps one long-lived store handle. Clones share it.
#[derive(Clone)]
pub struct StorageGateway {
    store: Arc<dyn ObjectStore>,
}

impl StorageGateway {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    /// Create the bucket if it is missing.
    ///
    /// Runs once at startup before any traffic is accepted; a second call
    /// is harmless. Any failure is fatal to startup.
    pub async fn ensure_bucket(&self) -> GatewayResult<()> {
        let bucket = self.bucket().to_string();
        let unavailable = |err: StoreError| GatewayError::BucketUnavailable {
            bucket: bucket.clone(),
            reason: err.to_string(),
        };

        if self.store.bucket_exists().await.map_err(unavailable)? {
            debug!(bucket = %bucket, "bucket already exists");
            return Ok(());
        }

        self.store.create_bucket().await.map_err(unavailable)?;
        info!(bucket = %bucket, "bucket created");
        Ok(())
    }

    /// Report whether the bucket is reachable. Used by readiness checks.
    pub async fn bucket_reachable(&self) -> Result<bool, String> {
        self.store.bucket_exists().await.map_err(|e| e.to_string())
    }

    /// Write an object with its content type and encoded original filename.
    ///
    /// The store verifies the Content-MD5 before committing, so a write
    /// either lands completely or not at all.
    pub async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        original_name: &str,
    ) -> GatewayResult<StoredObjectKey> {
        let key = sanitize(key)?;
        let size = body.len();
        let content_md5 = general_purpose::STANDARD.encode(md5::compute(&body).0);

        let metadata = HashMap::from([(
            ORIGINAL_NAME_METADATA.to_string(),
            encode_original_name(original_name),
        )]);

        self.store
            .put_object(PutObject {
                key: key.clone(),
                body,
                content_type: content_type.to_string(),
                content_md5,
                metadata,
                acl: CannedAcl::Private,
            })
            .await
            .map_err(|err| {
                error!(key = %key, error = %err, "object write failed");
                GatewayError::WriteFailed(err.to_string())
            })?;

        info!(key = %key, size, content_type, "object stored");
        Ok(StoredObjectKey::from_sanitized(key))
    }

    /// Fetch object metadata from the store.
    pub async fn stat(&self, key: &str) -> GatewayResult<StoredObjectMetadata> {
        let key = sanitize(key)?;
        let head = self
            .store
            .head_object(&key)
            .await
            .map_err(|err| map_store_error(err, GatewayError::LookupFailed))?;

        let original_name = head
            .metadata
            .get(ORIGINAL_NAME_METADATA)
            .map(|encoded| decode_original_name(encoded))
            .unwrap_or_else(|| key.clone());

        let content_type = head
            .content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| mime_for_name(&key).to_string());

        Ok(StoredObjectMetadata {
            key,
            original_name,
            content_type,
            size_bytes: head.content_length,
            last_modified: head.last_modified,
            etag: head.etag,
        })
    }

    /// Read a whole object into memory.
    ///
    /// Memory use is bounded by the upload size ceiling. Raising that
    /// ceiling means callers should move to [`StorageGateway::get_stream`].
    pub async fn get_buffer(&self, key: &str) -> GatewayResult<Bytes> {
        let mut stream = self.get_stream(key).await?;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| {
                map_store_error(StoreError::from_stream_error(err), GatewayError::LookupFailed)
            })?;
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }

    /// Open an object body without buffering it.
    ///
    /// Errors raised mid-stream surface as `std::io::Error` items.
    pub async fn get_stream(&self, key: &str) -> GatewayResult<ObjectStream> {
        let key = sanitize(key)?;
        debug!(key = %key, "opening object stream");
        self.store
            .get_object(&key)
            .await
            .map_err(|err| map_store_error(err, GatewayError::LookupFailed))
    }

    /// Issue a time-limited, credential-free download URL for an existing object.
    pub async fn presign(&self, key: &str, expiry_secs: u64) -> GatewayResult<String> {
        if expiry_secs == 0 || expiry_secs > MAX_PRESIGN_EXPIRY_SECS {
            return Err(GatewayError::InvalidExpiry(expiry_secs));
        }
        let key = sanitize(key)?;

        self.store
            .head_object(&key)
            .await
            .map_err(|err| map_store_error(err, GatewayError::SignFailed))?;

        self.store
            .presign_get(&key, Duration::from_secs(expiry_secs))
            .await
            .map_err(|err| map_store_error(err, GatewayError::SignFailed))
    }
}
