//! Session status endpoint.

use axum::{http::HeaderMap, Extension, Json};
use std::sync::Arc;

use super::types::{SessionInfo, StatusResponse};
use crate::api::error::AuthError;
use crate::auth::AuthCore;

#[utoipa::path(
    get,
    path = "/auth/status",
    responses(
        (status = 200, description = "Current session state", body = StatusResponse)
    ),
    tag = "auth"
)]
pub async fn status(
    headers: HeaderMap,
    Extension(core): Extension<Arc<AuthCore>>,
) -> Result<Json<StatusResponse>, AuthError> {
    // Read-only: this must not extend the idle window, so the record is
    // loaded without a touch.
    let response = match core.session_from_headers(&headers).await? {
        Some(record) => StatusResponse {
            authenticated: true,
            csrf_token: Some(record.csrf_token.clone()),
            session_info: Some(SessionInfo::from_record(&core, &record)),
        },
        None => StatusResponse {
            authenticated: false,
            csrf_token: None,
            session_info: None,
        },
    };
    Ok(Json(response))
}
