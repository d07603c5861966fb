//! HTTP mapping of auth failures.
//!
//! Authentication failures collapse into one body so clients cannot tell a
//! wrong password from an unknown account or a revoked session.

use crate::auth::AuthError;
use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

pub(crate) const INVALID_CREDENTIALS: &str = "invalid credentials";
pub(crate) const INVALID_TOKEN: &str = "invalid or expired token";

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub(crate) fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS)
    }

    pub(crate) fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden")
    }

    pub(crate) fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not found")
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub(crate) fn too_many_requests() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "too many requests")
    }

    /// Mapping for the invitation and reset flows, where a bad token is a
    /// client error rather than an authentication failure.
    pub(crate) fn from_token_flow(err: AuthError) -> Self {
        match err {
            AuthError::TokenNotFound | AuthError::TokenExpired | AuthError::AlreadyConsumed => {
                Self::bad_request(INVALID_TOKEN)
            }
            other => Self::from(other),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_authentication_failure() {
            return Self::unauthorized();
        }
        match err {
            AuthError::Unauthorized => Self::forbidden(),
            AuthError::InvalidInput(message) => Self::bad_request(message),
            AuthError::StorageUnavailable(detail) => {
                error!("Storage unavailable: {detail}");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "service unavailable")
            }
            other => {
                error!("Request failed: {other}");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retryable = self.status == StatusCode::SERVICE_UNAVAILABLE;
        let mut response = (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response();
        if retryable {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failures_are_uniform() {
        for err in [
            AuthError::InvalidCredentials,
            AuthError::TokenExpired,
            AuthError::TokenRevoked,
            AuthError::TokenReplayed,
            AuthError::TokenNotFound,
        ] {
            let api = ApiError::from(err);
            assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(api.message, INVALID_CREDENTIALS);
        }
    }

    #[test]
    fn token_flow_failures_are_bad_requests() {
        let api = ApiError::from_token_flow(AuthError::AlreadyConsumed);
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        assert_eq!(api.message, INVALID_TOKEN);

        let api = ApiError::from_token_flow(AuthError::InvalidInput("password is too short"));
        assert_eq!(api.message, "password is too short");
    }

    #[test]
    fn storage_outage_is_retryable() {
        let response =
            ApiError::from(AuthError::StorageUnavailable("pool timed out".to_string()))
                .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(RETRY_AFTER),
            Some(&HeaderValue::from_static("1"))
        );
    }

    #[test]
    fn forbidden_and_internal() {
        assert_eq!(
            ApiError::from(AuthError::Unauthorized).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthError::Internal("boom".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
