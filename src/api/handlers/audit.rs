use crate::{
    api::{
        error::{ApiError, ErrorBody},
        types::{AuditEntryView, AuditQuery},
    },
    auth::{AccessClaims, AuthState},
};
use axum::{
    extract::{Extension, Query},
    Json,
};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/v1/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries for the caller's tenant, newest first", body = [AuditEntryView]),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Caller is not an owner", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "audit"
)]
pub async fn list(
    state: Extension<Arc<AuthState>>,
    Extension(claims): Extension<AccessClaims>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntryView>>, ApiError> {
    let entries = state
        .audit_page(&claims, query.before, query.limit)
        .await?;
    Ok(Json(entries.into_iter().map(AuditEntryView::from).collect()))
}
