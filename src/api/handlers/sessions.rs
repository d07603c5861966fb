//! Session listing and revocation for the signed-in administrator.

use super::{refresh_cookie_value, Client};
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        types::{RevokeOthersResponse, SessionSummary},
    },
    auth::{AccessClaims, AuthState},
};
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/v1/sessions",
    responses(
        (status = 200, description = "Sessions, newest first. Owners see the whole tenant", body = [SessionSummary]),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn list(
    state: Extension<Arc<AuthState>>,
    Extension(claims): Extension<AccessClaims>,
    headers: HeaderMap,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let current = match refresh_cookie_value(&headers) {
        Some(token) => state
            .sessions()
            .find_by_token(&token)
            .await?
            .map(|session| session.id),
        None => None,
    };
    let sessions = state.list_sessions(&claims).await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|session| SessionSummary::from_session(session, current))
            .collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/sessions/{id}/revoke",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 404, description = "No such session visible to the caller", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn revoke(
    state: Extension<Arc<AuthState>>,
    Extension(claims): Extension<AccessClaims>,
    Client(client): Client,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state
        .revoke_session(&claims, id, client.address.as_deref())
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        warn!(session_id = %id, admin_id = %claims.sub, "Revoke requested for invisible session");
        Err(ApiError::not_found())
    }
}

#[utoipa::path(
    post,
    path = "/v1/sessions/revoke-others",
    responses(
        (status = 200, description = "Every other session revoked", body = RevokeOthersResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn revoke_others(
    state: Extension<Arc<AuthState>>,
    Extension(claims): Extension<AccessClaims>,
    Client(client): Client,
    headers: HeaderMap,
) -> Result<Json<RevokeOthersResponse>, ApiError> {
    let current = refresh_cookie_value(&headers);
    let revoked_count = state
        .revoke_other_sessions(&claims, current.as_deref(), client.address.as_deref())
        .await?;
    Ok(Json(RevokeOthersResponse { revoked_count }))
}
