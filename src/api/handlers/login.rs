//! Login endpoint: the only path through which the ledger, the verifier,
//! and session issuance interact.

use axum::{
    extract::ConnectInfo,
    http::{header::SET_COOKIE, HeaderMap},
    response::{Html, IntoResponse, Response},
    Extension, Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    remote_identity,
    types::{LoginRequest, LoginResponse, SessionInfo},
    JsonOrForm,
};
use crate::api::{error::AuthError, gate};
use crate::auth::{AuthCore, Decision};

const LOGIN_PAGE: &str = include_str!("login.html");

#[utoipa::path(
    get,
    path = "/auth/login",
    responses(
        (status = 200, description = "Login form (HTML)")
    ),
    tag = "auth"
)]
pub async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; session cookie set", body = LoginResponse),
        (status = 400, description = "Missing or empty password"),
        (status = 401, description = "Invalid password"),
        (status = 403, description = "CSRF token mismatch on an existing session"),
        (status = 429, description = "Progressive delay or lockout in effect")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Extension(core): Extension<Arc<AuthCore>>,
    JsonOrForm(request): JsonOrForm<LoginRequest>,
) -> Result<Response, AuthError> {
    let Some(password) = request.password.filter(|password| !password.is_empty()) else {
        return Err(AuthError::Validation("Password is required".to_string()));
    };

    let remote_id = remote_identity(&headers, peer.as_ref());

    // A caller that already holds a session must present the CSRF token
    // bound to it; only the very first login gets the exemption.
    let existing = core.session_from_headers(&headers).await?;
    if let Some(ref session) = existing {
        let presented = request.csrf_token.as_deref().unwrap_or_default();
        if !core.csrf_matches(session, presented) {
            info!(remote_id, "Login refused: CSRF mismatch on existing session");
            return Err(AuthError::CsrfMismatch);
        }
    }

    // The ledger gates the verifier: a delayed or locked-out remote never
    // reaches the hash, correct password or not.
    match core.ledger().check(&remote_id) {
        Decision::Allow => {}
        Decision::Delay(delay_seconds) => {
            warn!(remote_id, delay_seconds, "Login throttled");
            return Err(AuthError::Delayed { delay_seconds });
        }
        Decision::LockedOut(lockout_seconds) => {
            warn!(remote_id, lockout_seconds, "Login refused during lockout");
            return Err(AuthError::LockedOut { lockout_seconds });
        }
    }

    if !core.verify_password(&password).await {
        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok());
        core.ledger().observe_failure(&remote_id, user_agent);
        info!(remote_id, "Login failed: invalid password");
        return Err(AuthError::InvalidPassword {
            remaining_attempts: core.ledger().remaining_attempts(&remote_id),
        });
    }

    core.ledger().clear(&remote_id);
    if let Some(previous) = existing {
        core.sessions().destroy(&previous.session_id).await?;
    }
    let record = core
        .issue_session(request.remember)
        .await
        .map_err(AuthError::Internal)?;

    let cookie =
        gate::session_cookie(&core, &record).map_err(|err| AuthError::Internal(err.into()))?;
    info!(remote_id, remember = record.remember, "Login succeeded");

    let body = LoginResponse {
        success: true,
        csrf_token: record.csrf_token.clone(),
        session_info: SessionInfo::from_record(&core, &record),
    };
    Ok(([(SET_COOKIE, cookie)], Json(body)).into_response())
}
