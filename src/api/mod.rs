use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    response::Response,
    routing::{get, post},
    Extension, Router,
};
use std::{any::Any, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::watch};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use uuid::Uuid;

use crate::auth::{session, AuthCore, SessionStore, TokenSigner};
use crate::config::SecurityConfig;

pub mod error;
pub mod gate;
pub mod handlers;
// OpenAPI document assembly lives in openapi.rs.
mod openapi;

pub use openapi::ApiDoc;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Assemble the auth router around a constructed core.
///
/// Privileged routes are marked at registration with the
/// `require_authenticated` route layer; the gate middleware wraps the
/// whole router and runs first.
#[must_use]
pub fn router(core: Arc<AuthCore>) -> Router {
    Router::new()
        .route(
            "/auth/login",
            get(handlers::login_page).post(handlers::login),
        )
        .route(
            "/auth/logout",
            post(handlers::logout).route_layer(middleware::from_fn(gate::require_authenticated)),
        )
        .route("/auth/status", get(handlers::status))
        .route("/auth/csrf-token", get(handlers::csrf_token))
        .route(
            "/auth/change-password",
            post(handlers::change_password)
                .route_layer(middleware::from_fn(gate::require_authenticated)),
        )
        .route("/health", get(handlers::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .layer(middleware::from_fn(gate::gate))
        .layer(Extension(core))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, config: SecurityConfig) -> Result<()> {
    let config = Arc::new(config);

    let signer = TokenSigner::new(config.signing_key());
    let store = session::FsSessionStore::open(
        config.state_dir(),
        signer,
        config.session_idle_timeout(),
        config.remember_lifetime(),
    )
    .context("Failed to open session store")?;
    let sessions: Arc<dyn SessionStore> = Arc::new(store);
    let core = Arc::new(AuthCore::new(Arc::clone(&config), Arc::clone(&sessions)));

    // Sweeper lifetime is scoped to the server: it exits between scans
    // once the shutdown signal fires.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = session::sweeper::spawn(
        sessions,
        core.ledger_handle(),
        Duration::from_secs(config.sweep_interval()),
        config.remember_lifetime(),
        shutdown_rx,
    );

    let app = router(core).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(CatchPanicLayer::custom(handle_panic)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
        info!("Gracefully shutdown");
    })
    .await?;

    let _ = sweeper.await;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// A panicking handler becomes the generic 500 envelope; the detail only
/// reaches the log, keyed by a stable error id.
fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let error_id = Uuid::new_v4();
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(%error_id, "Handler panicked: {detail}");

    let body = serde_json::json!({
        "error": "Internal server error",
        "code": "internal_error",
        "error_id": error_id.to_string(),
    });
    Response::builder()
        .status(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_default()
}
