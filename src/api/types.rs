//! Request and response bodies for the HTTP API.

use crate::store::{AuditAction, AuditEntry, AuditSeverity, Role, Session, TenantId};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    pub tenant_id: TenantId,
    pub email: String,
    pub password: String,
}

// Never log the password.
impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("tenant_id", &self.tenant_id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Issued on login and refresh. The refresh token travels only in the cookie.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub role: Role,
    pub current_session_id: Uuid,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyResponse {
    pub admin_id: Uuid,
    pub tenant_id: TenantId,
    pub email: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionSummary {
    pub id: Uuid,
    pub admin_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_used_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub revoked: bool,
    pub rotation_count: i32,
    pub client_address: Option<String>,
    pub user_agent: Option<String>,
    pub current: bool,
}

impl SessionSummary {
    pub(crate) fn from_session(session: Session, current: Option<Uuid>) -> Self {
        Self {
            current: current == Some(session.id),
            id: session.id,
            admin_id: session.admin_id,
            created_at: session.created_at,
            last_used_at: session.last_used_at,
            expires_at: session.expires_at,
            revoked: session.revoked,
            rotation_count: session.rotation_count,
            client_address: session.client.address,
            user_agent: session.client.user_agent,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RevokeOthersResponse {
    pub revoked_count: u64,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct InviteRequest {
    pub email: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct InviteResponse {
    pub email: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Body for invitation acceptance and reset confirmation.
#[derive(ToSchema, Deserialize)]
pub struct TokenPasswordRequest {
    pub token: String,
    pub password: String,
}

impl std::fmt::Debug for TokenPasswordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPasswordRequest").finish_non_exhaustive()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AdminResponse {
    pub admin_id: Uuid,
    pub email: String,
    pub role: Role,
    pub tenant_id: TenantId,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ResetRequestBody {
    pub tenant_id: TenantId,
    pub email: String,
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    /// Only entries recorded strictly before this RFC 3339 instant.
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[param(value_type = Option<String>)]
    pub before: Option<OffsetDateTime>,
    /// Page size, capped at 200.
    pub limit: Option<i64>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuditEntryView {
    pub id: Uuid,
    pub actor_email: String,
    pub action: AuditAction,
    pub severity: AuditSeverity,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub source_address: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl From<AuditEntry> for AuditEntryView {
    fn from(entry: AuditEntry) -> Self {
        Self {
            id: entry.id,
            actor_email: entry.actor_email,
            action: entry.action,
            severity: entry.severity,
            payload: entry.payload,
            source_address: entry.source_address,
            recorded_at: entry.recorded_at,
        }
    }
}
