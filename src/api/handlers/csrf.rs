//! CSRF token issuance and rotation.

use axum::{http::HeaderMap, Extension, Json};
use std::sync::Arc;
use tracing::debug;

use super::types::CsrfTokenResponse;
use crate::api::error::AuthError;
use crate::auth::{now_unix, session::generate_token, AuthCore};

#[utoipa::path(
    get,
    path = "/auth/csrf-token",
    responses(
        (status = 200, description = "Token bound to the caller's session, or null \
            when no session exists (the first login needs no token)", body = CsrfTokenResponse)
    ),
    tag = "auth"
)]
pub async fn csrf_token(
    headers: HeaderMap,
    Extension(core): Extension<Arc<AuthCore>>,
) -> Result<Json<CsrfTokenResponse>, AuthError> {
    let Some(mut record) = core.session_from_headers(&headers).await? else {
        return Ok(Json(CsrfTokenResponse { csrf_token: None }));
    };

    // Explicit request rotates the bound token.
    record.csrf_token = generate_token().map_err(AuthError::Internal)?;
    record.csrf_issued_at_unix = now_unix();
    core.sessions().update(&record).await?;
    debug!("Rotated CSRF token for an authenticated session");

    Ok(Json(CsrfTokenResponse {
        csrf_token: Some(record.csrf_token),
    }))
}
