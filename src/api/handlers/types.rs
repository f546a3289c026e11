//! Request/response types for the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{AuthCore, SessionRecord};

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub password: Option<String>,
    #[serde(default)]
    pub remember: bool,
    pub csrf_token: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct LogoutRequest {
    pub csrf_token: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub confirm_password: Option<String>,
    pub csrf_token: Option<String>,
}

#[derive(ToSchema, Serialize, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub created_at: i64,
    pub last_seen_at: i64,
    pub expires_at: i64,
    pub remember: bool,
}

impl SessionInfo {
    #[must_use]
    pub fn from_record(core: &AuthCore, record: &SessionRecord) -> Self {
        Self {
            created_at: record.created_at_unix,
            last_seen_at: record.last_seen_at_unix,
            expires_at: record.expires_at_unix(
                core.config().session_idle_timeout(),
                core.config().remember_lifetime(),
            ),
            remember: record.remember,
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
pub struct LoginResponse {
    pub success: bool,
    pub csrf_token: String,
    pub session_info: SessionInfo,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct StatusResponse {
    pub authenticated: bool,
    pub csrf_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_info: Option<SessionInfo>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct CsrfTokenResponse {
    pub csrf_token: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
