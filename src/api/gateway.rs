//! Request gate for protected routes.
//!
//! Flow Overview: read `Authorization: Bearer`, verify the access token, and
//! hand the typed claims to the handler through request extensions. Any
//! failure answers 401 with the uniform body and has no side effect.

use super::error::ApiError;
use crate::{
    auth::{AccessClaims, AuthError, AuthState, Clock, TokenError, TokenIssuer},
    store::Role,
};
use axum::{
    extract::{Extension, Request},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Resolve the bearer token in `headers` into verified claims.
///
/// # Errors
///
/// [`AuthError::InvalidCredentials`] when the header is missing or the token
/// does not verify, [`AuthError::TokenExpired`] once it has expired.
pub fn authenticate(
    headers: &HeaderMap,
    issuer: &TokenIssuer,
    clock: &dyn Clock,
) -> Result<AccessClaims, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::InvalidCredentials)?;
    issuer.verify(token, clock.now()).map_err(|err| {
        debug!("Rejected access token: {err}");
        match err {
            TokenError::Expired => AuthError::TokenExpired,
            _ => AuthError::InvalidCredentials,
        }
    })
}

pub async fn require_auth(
    Extension(state): Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(request.headers(), state.issuer(), state.clock()) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(_) => ApiError::unauthorized().into_response(),
    }
}

/// Must run after [`require_auth`].
pub async fn require_role(required: Role, request: Request, next: Next) -> Response {
    let role = request
        .extensions()
        .get::<AccessClaims>()
        .map(|claims| claims.role);
    match role {
        None => ApiError::unauthorized().into_response(),
        Some(role) if role != required => ApiError::forbidden().into_response(),
        Some(_) => next.run(request).await,
    }
}
