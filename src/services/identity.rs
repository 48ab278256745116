//! Bearer-token validation against an external identity provider.
//!
//! The gateway only needs to know that a request is authenticated; the
//! [`Principal`] is opaque to everything behind the auth middleware.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication token not provided")]
    MissingToken,
    #[error("invalid authentication token")]
    InvalidToken,
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Authenticated caller, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Validates tokens with Supabase Auth (`GET /auth/v1/user`).
#[derive(Clone)]
pub struct SupabaseIdentity {
    http: reqwest::Client,
    user_endpoint: String,
    anon_key: String,
}

#[derive(Deserialize)]
struct SupabaseUser {
    id: String,
    email: Option<String>,
}

impl SupabaseIdentity {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            user_endpoint: format!("{}/auth/v1/user", base_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let response = self
            .http
            .get(&self.user_endpoint)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let user: SupabaseUser = response
                    .json()
                    .await
                    .map_err(|_| AuthError::InvalidToken)?;
                Ok(Principal {
                    id: user.id,
                    email: user.email,
                })
            }
            status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                Err(AuthError::Unavailable(format!("identity provider returned {status}")))
            }
            status => {
                debug!(%status, "token rejected by identity provider");
                Err(AuthError::InvalidToken)
            }
        }
    }
}

/// Accepts a fixed set of tokens. Used by handler tests.
#[cfg(test)]
pub struct StaticIdentity {
    pub tokens: Vec<(String, Principal)>,
}

#[cfg(test)]
#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens
            .iter()
            .find(|(candidate, _)| candidate == token)
            .map(|(_, principal)| principal.clone())
            .ok_or(AuthError::InvalidToken)
    }
}
