//! Per-request gate: resolves the session cookie, exposes the
//! authentication flag, and stamps the defensive header set on every
//! response.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{
        header::{InvalidHeaderValue, ACCEPT, LOCATION},
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use tracing::debug;

use super::error::AuthError;
use crate::auth::{AuthCore, SessionRecord, SESSION_COOKIE_NAME};

/// Authentication status the gate resolved for the current request.
#[derive(Clone, Debug, Default)]
pub struct RequestAuth {
    session: Option<SessionRecord>,
}

impl RequestAuth {
    #[must_use]
    pub fn authenticated(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn session(&self) -> Option<&SessionRecord> {
        self.session.as_ref()
    }
}

/// Static assets are served without touching session state.
fn is_static_asset(path: &str) -> bool {
    path.starts_with("/static/") || path.starts_with("/assets/") || path == "/favicon.ico"
}

/// Endpoints that must stay reachable without a session; they resolve the
/// cookie themselves when they need it and never extend the idle window.
fn is_login_family(path: &str) -> bool {
    matches!(
        path,
        "/auth/login" | "/auth/status" | "/auth/csrf-token" | "/health" | "/openapi.json"
    )
}

/// Pre/post middleware applied to the whole router.
///
/// Pre: classify the path, resolve and touch the session for gated
/// traffic, expose `RequestAuth`. Post: stamp every configured security
/// header. Storage failure is a 500, never a 401: the caller may well be
/// authenticated.
pub async fn gate(
    Extension(core): Extension<Arc<AuthCore>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let auth = if is_static_asset(&path) || is_login_family(&path) {
        RequestAuth::default()
    } else {
        match core.session_from_headers(request.headers()).await {
            Ok(Some(record)) => {
                if let Err(err) = core.sessions().touch(&record.session_id).await {
                    return stamp_headers(AuthError::Storage(err).into_response(), &core);
                }
                RequestAuth {
                    session: Some(record),
                }
            }
            Ok(None) => RequestAuth::default(),
            Err(err) => return stamp_headers(AuthError::Storage(err).into_response(), &core),
        }
    };

    request.extensions_mut().insert(auth);
    let response = next.run(request).await;
    stamp_headers(response, &core)
}

/// Route-level marker for privileged handlers: refuse to execute unless
/// the gate resolved an authenticated session. JSON clients get 401 with
/// the standard envelope; HTML clients are redirected to the login page.
pub async fn require_authenticated(request: Request, next: Next) -> Response {
    let authenticated = request
        .extensions()
        .get::<RequestAuth>()
        .is_some_and(RequestAuth::authenticated);
    if authenticated {
        return next.run(request).await;
    }

    debug!(path = request.uri().path(), "Refusing unauthenticated request");
    if wants_html(request.headers()) {
        (
            StatusCode::FOUND,
            [(LOCATION, HeaderValue::from_static("/auth/login"))],
        )
            .into_response()
    } else {
        AuthError::AuthRequired.into_response()
    }
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| {
            accept
                .split(',')
                .map(str::trim)
                .take_while(|media| !media.starts_with("application/json"))
                .any(|media| media.starts_with("text/html"))
        })
}

fn stamp_headers(mut response: Response, core: &AuthCore) -> Response {
    for (name, value) in core.config().security_headers() {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            continue;
        };
        response.headers_mut().insert(name, value);
    }
    response
}

/// Build the signed session cookie. Browser-session lifetime by default;
/// `Max-Age` is only sent for remembered sessions. The server-side expiry
/// stays authoritative either way.
///
/// # Errors
/// Returns an error when the cookie string is not a valid header value.
pub fn session_cookie(
    core: &AuthCore,
    record: &SessionRecord,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let config = core.config();
    let signed = core.signer().sign(&record.session_id);
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={signed}; Path=/; HttpOnly; SameSite={}",
        config.samesite().as_str()
    );
    if record.remember {
        use std::fmt::Write;
        let _ = write!(cookie, "; Max-Age={}", config.remember_lifetime());
    }
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Cookie that clears the session on the client.
///
/// # Errors
/// Returns an error when the cookie string is not a valid header value.
pub fn clear_session_cookie(core: &AuthCore) -> Result<HeaderValue, InvalidHeaderValue> {
    let config = core.config();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite={}; Max-Age=0",
        config.samesite().as_str()
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}
