//! HTTP surface.

use crate::{auth::AuthState, store::Role};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware::{self, Next},
    routing::{get, post},
    Extension, Json, Router,
};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;

pub mod error;
pub mod gateway;
pub mod handlers;
mod openapi;
pub mod types;

pub use openapi::openapi;

use handlers::{audit, auth, health, invitations, password_reset, sessions};

/// Build the application router with every route and the shared layers.
///
/// # Errors
///
/// Returns an error if the configured frontend URL is not a valid origin.
pub fn router(state: Arc<AuthState>) -> Result<Router> {
    let frontend_origin = frontend_origin(state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let owner_only = Router::new()
        .route("/v1/invitations", post(invitations::create))
        .route("/v1/audit", get(audit::list))
        .route_layer(middleware::from_fn(|request: Request, next: Next| {
            gateway::require_role(Role::Owner, request, next)
        }));

    let protected = Router::new()
        .route("/v1/auth/verify", get(auth::verify))
        .route("/v1/sessions", get(sessions::list))
        .route("/v1/sessions/revoke-others", post(sessions::revoke_others))
        .route("/v1/sessions/:id/revoke", post(sessions::revoke))
        .merge(owner_only)
        .route_layer(middleware::from_fn(gateway::require_auth));

    let app = Router::new()
        .route("/health", get(health::health).options(health::health))
        .route("/openapi.json", get(|| async { Json(openapi()) }))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/refresh", post(auth::refresh))
        .route("/v1/auth/logout", post(auth::logout))
        .route("/v1/invitations/accept", post(invitations::accept))
        .route("/v1/password-reset", post(password_reset::request))
        .route("/v1/password-reset/confirm", post(password_reset::confirm))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state)),
        );

    Ok(app)
}

/// Serve until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the router cannot be built or the server fails.
pub async fn serve<F>(listener: TcpListener, state: Arc<AuthState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state)?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("HTTP server failed")?;

    info!("Gracefully shutdown");
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

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
