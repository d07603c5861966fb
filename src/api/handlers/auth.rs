//! Login, refresh, logout and token verification endpoints.

use super::{clear_refresh_cookie, refresh_cookie, refresh_cookie_value, Client};
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        types::{LoginRequest, TokenResponse, VerifyResponse},
    },
    auth::{
        rate_limit::{RateLimitAction, RateLimitDecision},
        AccessClaims, AuthConfig, AuthState, SignedIn,
    },
};
use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, instrument};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; refresh token set as cookie", body = TokenResponse),
        (status = 400, description = "Missing or malformed payload", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 429, description = "Too many attempts", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    state: Extension<Arc<AuthState>>,
    Client(client): Client,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::bad_request("missing payload"));
    };

    let limiter = state.rate_limiter();
    if limiter.check_ip(client.address.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
        || limiter.check_email(&request.email, RateLimitAction::Login)
            == RateLimitDecision::Limited
    {
        return Err(ApiError::too_many_requests());
    }

    let signed_in = state
        .login(request.tenant_id, &request.email, &request.password, &client)
        .await?;
    token_response(state.config(), &signed_in)
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    responses(
        (status = 200, description = "Refresh token rotated", body = TokenResponse),
        (status = 401, description = "Missing, revoked, expired or replayed refresh token", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    state: Extension<Arc<AuthState>>,
    Client(client): Client,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let Some(token) = refresh_cookie_value(&headers) else {
        return Ok(with_cleared_cookie(
            state.config(),
            ApiError::unauthorized().into_response(),
        ));
    };

    match state.refresh(&token, &client).await {
        Ok(signed_in) => token_response(state.config(), &signed_in),
        Err(err) if err.is_authentication_failure() => Ok(with_cleared_cookie(
            state.config(),
            ApiError::from(err).into_response(),
        )),
        Err(err) => Err(err.into()),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session revoked and cookie cleared"),
        (status = 503, description = "Storage unavailable; the cookie is kept for a retry", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(
    state: Extension<Arc<AuthState>>,
    Client(client): Client,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = refresh_cookie_value(&headers) {
        state.logout(&token, &client).await?;
    }
    // Unknown or already revoked sessions still get the cookie cleared.
    Ok(with_cleared_cookie(
        state.config(),
        StatusCode::NO_CONTENT.into_response(),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/auth/verify",
    responses(
        (status = 200, description = "Access token is valid", body = VerifyResponse),
        (status = 401, description = "Missing, invalid or expired access token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn verify(Extension(claims): Extension<AccessClaims>) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        admin_id: claims.sub,
        tenant_id: claims.tid,
        email: claims.email,
        role: claims.role,
        expires_at: claims.exp,
    })
}

fn token_response(config: &AuthConfig, signed_in: &SignedIn) -> Result<Response, ApiError> {
    let cookie = refresh_cookie(config, &signed_in.refresh_token).map_err(|err| {
        error!("Failed to build refresh cookie: {err}");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    })?;
    let body = TokenResponse {
        access_token: signed_in.access.token.clone(),
        token_type: "Bearer".to_string(),
        expires_in: config.access_ttl_seconds(),
        role: signed_in.admin.role,
        current_session_id: signed_in.session.id,
    };
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    Ok((StatusCode::OK, headers, Json(body)).into_response())
}

fn with_cleared_cookie(config: &AuthConfig, mut response: Response) -> Response {
    match clear_refresh_cookie(config) {
        Ok(cookie) => {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build cookie: {err}"),
    }
    response
}
