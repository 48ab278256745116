//! Core data models for the file gateway.
//!
//! Uploads arrive as an [`upload::UploadCandidate`] and leave as an
//! [`upload::UploadReceipt`]; stored objects are addressed by an
//! [`object::StoredObjectKey`] and described by [`object::StoredObjectMetadata`].

pub mod object;
pub mod upload;
