//! Core services: filename sanitizing, upload validation, key generation,
//! the object store gateway and the identity collaborator.

pub mod identity;
pub mod key_generator;
pub mod object_store;
pub mod sanitizer;
pub mod storage_gateway;
pub mod upload_validator;
