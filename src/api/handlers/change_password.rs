//! Shared-credential rotation.
//!
//! On success the new verifier is committed to disk before the in-memory
//! swap, and every session is destroyed, the caller's included.

use axum::{
    http::header::SET_COOKIE,
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    types::{ChangePasswordRequest, SuccessResponse},
    JsonOrForm,
};
use crate::api::{
    error::AuthError,
    gate::{self, RequestAuth},
};
use crate::auth::{password, AuthCore};

#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Credential rotated; all sessions destroyed", body = SuccessResponse),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Current password incorrect"),
        (status = 403, description = "CSRF token missing or mismatched"),
        (status = 500, description = "Verifier could not be persisted")
    ),
    tag = "auth"
)]
pub async fn change_password(
    Extension(core): Extension<Arc<AuthCore>>,
    Extension(auth): Extension<RequestAuth>,
    JsonOrForm(request): JsonOrForm<ChangePasswordRequest>,
) -> Result<Response, AuthError> {
    let Some(session) = auth.session() else {
        return Err(AuthError::AuthRequired);
    };

    let current = required_field(request.current_password, "current_password")?;
    let new = required_field(request.new_password, "new_password")?;
    let confirm = required_field(request.confirm_password, "confirm_password")?;

    let presented = request.csrf_token.as_deref().unwrap_or_default();
    if !core.csrf_matches(session, presented) {
        return Err(AuthError::CsrfMismatch);
    }

    if new != confirm {
        return Err(AuthError::Validation(
            "New password and confirmation do not match".to_string(),
        ));
    }
    password::check_strength(&new).map_err(|violation| {
        AuthError::Validation(violation.to_string())
    })?;

    if !core.verify_password(&current).await {
        warn!("Password change refused: current password incorrect");
        return Err(AuthError::CurrentPasswordIncorrect);
    }
    if new == current {
        return Err(AuthError::Validation(
            "New password must differ from the current password".to_string(),
        ));
    }

    core.rotate_password(&new).await.map_err(AuthError::Internal)?;
    info!("Admin credential rotated; all sessions destroyed");

    let cookie =
        gate::clear_session_cookie(&core).map_err(|err| AuthError::Internal(err.into()))?;
    let body = SuccessResponse {
        success: true,
        message: Some(
            "Password changed; all sessions have been signed out, please log in again".to_string(),
        ),
    };
    Ok(([(SET_COOKIE, cookie)], Json(body)).into_response())
}

fn required_field(value: Option<String>, name: &str) -> Result<String, AuthError> {
    value
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AuthError::Validation(format!("{name} is required")))
}
