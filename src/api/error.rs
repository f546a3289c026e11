//! Typed authentication errors and their mapping onto the wire envelope.
//!
//! Every failure surfaces as `{error, code, ...}` so callers can branch on
//! `code` without parsing the human message. Unexpected failures are
//! logged under a stable error id and never leak detail to the wire.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::auth::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Input validation failure; the message is safe to show the caller.
    #[error("{0}")]
    Validation(String),
    #[error("Invalid password")]
    InvalidPassword { remaining_attempts: u32 },
    #[error("Current password is incorrect")]
    CurrentPasswordIncorrect,
    #[error("Authentication required")]
    AuthRequired,
    #[error("Invalid CSRF token")]
    CsrfMismatch,
    #[error("Too many failed attempts")]
    Delayed { delay_seconds: u64 },
    #[error("Too many failed attempts")]
    LockedOut { lockout_seconds: u64 },
    #[error("session storage failure")]
    Storage(#[from] StoreError),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message, "code": "validation_error" })),
            )
                .into_response(),
            Self::InvalidPassword { remaining_attempts } => (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Invalid password",
                    "code": "invalid_password",
                    "remaining_attempts": remaining_attempts,
                })),
            )
                .into_response(),
            Self::CurrentPasswordIncorrect => (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Current password is incorrect",
                    "code": "invalid_password",
                })),
            )
                .into_response(),
            Self::AuthRequired => (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Authentication required",
                    "code": "auth_required",
                })),
            )
                .into_response(),
            Self::CsrfMismatch => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "Invalid CSRF token",
                    "code": "invalid_csrf",
                })),
            )
                .into_response(),
            Self::Delayed { delay_seconds } => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": format!(
                        "Too many failed attempts; retry in {delay_seconds} seconds"
                    ),
                    "code": "retry_delay",
                    "delay_seconds": delay_seconds,
                })),
            )
                .into_response(),
            Self::LockedOut { lockout_seconds } => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Too many failed attempts; temporarily locked out",
                    "code": "locked_out",
                    "lockout_seconds": lockout_seconds,
                })),
            )
                .into_response(),
            Self::Storage(err) => {
                let error_id = Uuid::new_v4();
                error!(%error_id, "Session storage failure: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Temporary storage failure, please retry",
                        "code": "storage_error",
                        "error_id": error_id.to_string(),
                    })),
                )
                    .into_response()
            }
            Self::Internal(err) => {
                let error_id = Uuid::new_v4();
                error!(%error_id, "Unexpected error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error",
                        "code": "internal_error",
                        "error_id": error_id.to_string(),
                    })),
                )
                    .into_response()
            }
        }
    }
}
