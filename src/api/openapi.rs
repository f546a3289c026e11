//! OpenAPI document for the auth surface.

use axum::Json;
use utoipa::OpenApi;

use super::handlers::types::{
    ChangePasswordRequest, CsrfTokenResponse, LoginRequest, LoginResponse, LogoutRequest,
    SessionInfo, StatusResponse, SuccessResponse,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "gardi",
        description = "Authentication and access control for a points-of-interest backend"
    ),
    paths(
        crate::api::handlers::login::login_page,
        crate::api::handlers::login::login,
        crate::api::handlers::logout::logout,
        crate::api::handlers::status::status,
        crate::api::handlers::csrf::csrf_token,
        crate::api::handlers::change_password::change_password,
        crate::api::handlers::health::health,
    ),
    components(schemas(
        LoginRequest,
        LoginResponse,
        LogoutRequest,
        ChangePasswordRequest,
        StatusResponse,
        CsrfTokenResponse,
        SuccessResponse,
        SessionInfo,
    )),
    tags(
        (name = "auth", description = "Session lifecycle and credential rotation"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
