use super::Client;
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        types::{ResetRequestBody, TokenPasswordRequest},
    },
    auth::{
        rate_limit::{RateLimitAction, RateLimitDecision},
        AuthState,
    },
};
use axum::{extract::Extension, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{error, warn};

#[utoipa::path(
    post,
    path = "/v1/password-reset",
    request_body = ResetRequestBody,
    responses(
        (status = 202, description = "If the account exists, a reset link was emailed"),
        (status = 400, description = "Missing payload", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody)
    ),
    tag = "password-reset"
)]
pub async fn request(
    state: Extension<Arc<AuthState>>,
    Client(client): Client,
    payload: Option<Json<ResetRequestBody>>,
) -> Result<StatusCode, ApiError> {
    let Some(Json(body)) = payload else {
        return Err(ApiError::bad_request("missing payload"));
    };

    let limiter = state.rate_limiter();
    if limiter.check_ip(client.address.as_deref(), RateLimitAction::PasswordReset)
        == RateLimitDecision::Limited
    {
        return Err(ApiError::too_many_requests());
    }
    if limiter.check_email(&body.email, RateLimitAction::PasswordReset)
        == RateLimitDecision::Limited
    {
        // Same answer as success so a limited address is indistinguishable.
        warn!(tenant_id = body.tenant_id, "Password reset rate limited for email");
        return Ok(StatusCode::ACCEPTED);
    }

    // Failures are logged only; the answer never depends on the account.
    if let Err(err) = state
        .resets()
        .request(body.tenant_id, &body.email, client.address.as_deref())
        .await
    {
        error!(tenant_id = body.tenant_id, "Failed to issue password reset: {err}");
    }
    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(
    post,
    path = "/v1/password-reset/confirm",
    request_body = TokenPasswordRequest,
    responses(
        (status = 204, description = "Password replaced and every session revoked"),
        (status = 400, description = "Invalid or expired token, or weak password", body = ErrorBody)
    ),
    tag = "password-reset"
)]
pub async fn confirm(
    state: Extension<Arc<AuthState>>,
    Client(client): Client,
    payload: Option<Json<TokenPasswordRequest>>,
) -> Result<StatusCode, ApiError> {
    let Some(Json(body)) = payload else {
        return Err(ApiError::bad_request("missing payload"));
    };
    state
        .resets()
        .confirm(&body.token, &body.password, client.address.as_deref())
        .await
        .map_err(ApiError::from_token_flow)?;
    Ok(StatusCode::NO_CONTENT)
}
