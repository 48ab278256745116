use crate::services::{
    identity::AuthError, storage_gateway::GatewayError, upload_validator::ValidationError,
};
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::{error, warn};

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        let status = match err {
            ValidationError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ValidationError::DisallowedMimeType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ValidationError::MissingFile
            | ValidationError::InvalidName
            | ValidationError::SuspiciousName
            | ValidationError::DisallowedExtension { .. } => StatusCode::BAD_REQUEST,
        };
        warn!(error = %err, "upload rejected");
        AppError::new(status, err.to_string())
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let status = match err {
            GatewayError::InvalidName(_) | GatewayError::InvalidExpiry(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::WriteFailed(_)
            | GatewayError::LookupFailed(_)
            | GatewayError::SignFailed(_)
            | GatewayError::BucketUnavailable { .. } => {
                error!(error = %err, "storage operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError::new(status, err.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let status = match err {
            AuthError::MissingToken | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::Unavailable(_) => {
                error!(error = %err, "identity provider call failed");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        AppError::new(status, err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(err.status(), err.body_text())
    }
}
