//! Represents an object stored in the remote bucket.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Key of a stored object.
///
/// Keys are produced once by the key generator or by re-sanitizing a caller
/// supplied key, so a value of this type never holds `..`, `/` or `\`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StoredObjectKey(String);

impl StoredObjectKey {
    /// Wrap an already sanitized key. Only the sanitizer and key generator
    /// call this.
    pub(crate) fn from_sanitized(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StoredObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attributes of a stored object as reported by the remote store.
///
/// The store owns this data; the gateway reads it on every request and
/// never caches it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObjectMetadata {
    /// Object key within the bucket.
    pub key: String,

    /// Client filename recovered from the percent-encoded metadata entry.
    pub original_name: String,

    /// Content type (MIME type).
    pub content_type: String,

    /// Size in bytes.
    #[serde(rename = "size")]
    pub size_bytes: u64,

    /// Timestamp when the object was last modified.
    pub last_modified: Option<DateTime<Utc>>,

    /// Entity tag reported by the store.
    pub etag: Option<String>,
}
