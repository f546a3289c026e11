pub mod change_password;
pub mod csrf;
pub mod health;
pub mod login;
pub mod logout;
pub mod status;
pub mod types;

pub use self::change_password::change_password;
pub use self::csrf::csrf_token;
pub use self::health::health;
pub use self::login::{login, login_page};
pub use self::logout::logout;
pub use self::status::status;

// common helpers for the handlers
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequest, Request},
    http::header::CONTENT_TYPE,
    Form, Json,
};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;

use super::error::AuthError;

/// Accepts the same field names as a JSON body or form-encoded fields.
/// Parse failures become 400 before any authentication work runs.
pub struct JsonOrForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|err| AuthError::Validation(format!("Invalid form body: {err}")))?;
            return Ok(Self(value));
        }

        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|err| AuthError::Validation(format!("Invalid JSON body: {err}")))?;
        Ok(Self(value))
    }
}

/// Remote identity for the attempt ledger: first forwarded-for hop, then
/// `X-Real-IP`, then the peer address.
pub(crate) fn remote_identity(
    headers: &axum::http::HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }
    peer.map_or_else(
        || "unknown".to_string(),
        |ConnectInfo(addr)| addr.ip().to_string(),
    )
}
