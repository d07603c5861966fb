use super::Client;
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        types::{AdminResponse, InviteRequest, InviteResponse, TokenPasswordRequest},
    },
    auth::{AccessClaims, AuthError, AuthState},
    store::Role,
};
use axum::{extract::Extension, http::StatusCode, Json};
use std::sync::Arc;

#[utoipa::path(
    post,
    path = "/v1/invitations",
    request_body = InviteRequest,
    responses(
        (status = 201, description = "Invitation emailed", body = InviteResponse),
        (status = 400, description = "Invalid email or role", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Caller is not an owner", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "invitations"
)]
pub async fn create(
    state: Extension<Arc<AuthState>>,
    Extension(claims): Extension<AccessClaims>,
    Client(client): Client,
    payload: Option<Json<InviteRequest>>,
) -> Result<(StatusCode, Json<InviteResponse>), ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::bad_request("missing payload"));
    };
    let role: Role = request
        .role
        .parse()
        .map_err(|_| AuthError::InvalidInput("unknown role"))?;

    let link = state
        .invitations()
        .create(
            claims.tid,
            &claims,
            &request.email,
            role,
            client.address.as_deref(),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(InviteResponse {
            email: link.email,
            role: link.role,
            expires_at: link.expires_at,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/invitations/accept",
    request_body = TokenPasswordRequest,
    responses(
        (status = 201, description = "Administrator account ready", body = AdminResponse),
        (status = 400, description = "Invalid or expired token, or weak password", body = ErrorBody)
    ),
    tag = "invitations"
)]
pub async fn accept(
    state: Extension<Arc<AuthState>>,
    Client(client): Client,
    payload: Option<Json<TokenPasswordRequest>>,
) -> Result<(StatusCode, Json<AdminResponse>), ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::bad_request("missing payload"));
    };
    let admin = state
        .invitations()
        .accept(&request.token, &request.password, client.address.as_deref())
        .await
        .map_err(ApiError::from_token_flow)?;
    Ok((
        StatusCode::CREATED,
        Json(AdminResponse {
            admin_id: admin.id,
            email: admin.email,
            role: admin.role,
            tenant_id: admin.tenant_id,
        }),
    ))
}
