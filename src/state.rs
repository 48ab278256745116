//! Shared application state handed to every handler.

use crate::services::{
    identity::IdentityProvider, storage_gateway::StorageGateway, upload_validator::UploadPolicy,
};
use std::sync::Arc;

/// Process-wide handles created once at startup. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub gateway: StorageGateway,
    pub policy: Arc<UploadPolicy>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Lifetime of presigned URLs when the caller does not ask for one.
    pub default_presign_expiry_secs: u64,
}
