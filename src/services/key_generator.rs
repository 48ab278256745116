//! Storage key generation.
//!
//! A key is a random v4 UUID followed by the lower-cased extension of the
//! client filename. Nothing else from the client name reaches the key, so
//! there is no traversal or collision surface to defend. 122 random bits
//! make collisions negligible and no lookup against the store is made.

use crate::models::object::StoredObjectKey;
use crate::services::sanitizer::extension_of;
use uuid::Uuid;

pub fn generate(original_name: &str) -> StoredObjectKey {
    let id = Uuid::new_v4();
    let key = match extension_of(original_name) {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    };
    StoredObjectKey::from_sanitized(key)
}
