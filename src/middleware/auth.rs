//! Bearer-token authentication for the file routes.

use crate::{
    errors::AppError,
    services::identity::{AuthError, Principal},
    state::AppState,
};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

/// Require a valid `Authorization: Bearer <token>` header.
///
/// The token is checked with the configured identity provider and the
/// resulting [`Principal`] is stored in request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)
        .ok_or(AuthError::MissingToken)?
        .to_owned();

    let principal: Principal = match state.identity.authenticate(&token).await {
        Ok(principal) => principal,
        Err(err) => {
            warn!(error = %err, path = %request.uri().path(), "authentication failed");
            return Err(err.into());
        }
    };

    debug!(user = %principal.id, email = ?principal.email, "request authenticated");
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

fn bearer_token(request: &Request) -> Option<&str> {
    let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme == "Bearer" && !token.is_empty()).then_some(token)
}
