//! Logout endpoint.

use axum::{
    http::header::SET_COOKIE,
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;
use tracing::info;

use super::{
    types::{LogoutRequest, SuccessResponse},
    JsonOrForm,
};
use crate::api::{
    error::AuthError,
    gate::{self, RequestAuth},
};
use crate::auth::AuthCore;

#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Session destroyed", body = SuccessResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "CSRF token missing or mismatched")
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(core): Extension<Arc<AuthCore>>,
    Extension(auth): Extension<RequestAuth>,
    JsonOrForm(request): JsonOrForm<LogoutRequest>,
) -> Result<Response, AuthError> {
    let Some(session) = auth.session() else {
        return Err(AuthError::AuthRequired);
    };

    let presented = request.csrf_token.as_deref().unwrap_or_default();
    if !core.csrf_matches(session, presented) {
        return Err(AuthError::CsrfMismatch);
    }

    core.sessions().destroy(&session.session_id).await?;
    info!("Session terminated by logout");

    let cookie =
        gate::clear_session_cookie(&core).map_err(|err| AuthError::Internal(err.into()))?;
    let body = SuccessResponse {
        success: true,
        message: None,
    };
    Ok(([(SET_COOKIE, cookie)], Json(body)).into_response())
}
