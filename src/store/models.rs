//! Persisted entities shared by every storage backend.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Restaurant identifier; every administrator belongs to exactly one.
pub type TenantId = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Chef,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Chef => "chef",
        }
    }

    /// Permission set granted to newly created administrators of this role.
    #[must_use]
    pub fn default_permissions(self) -> Vec<String> {
        let granted: &[&str] = match self {
            Self::Owner => &[
                "menu:write",
                "orders:write",
                "sessions:manage",
                "invitations:create",
                "audit:read",
            ],
            Self::Chef => &["menu:write", "orders:write"],
        };
        granted.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "chef" => Ok(Self::Chef),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Clone)]
pub struct AdminUser {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub permissions: Vec<String>,
    pub disabled: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl fmt::Debug for AdminUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminUser")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("permissions", &self.permissions)
            .field("disabled", &self.disabled)
            .finish_non_exhaustive()
    }
}

/// Insert-or-update payload for administrators, keyed by (tenant, email).
#[derive(Clone)]
pub struct NewAdmin {
    pub tenant_id: TenantId,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub permissions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    Live,
    Revoked,
    Expired,
}

#[derive(Clone, Debug)]
pub struct Session {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub admin_id: Uuid,
    pub current_token_hash: Vec<u8>,
    pub rotation_count: i32,
    pub created_at: OffsetDateTime,
    pub last_used_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub revoked: bool,
    pub revoked_at: Option<OffsetDateTime>,
    pub client: ClientMeta,
}

impl Session {
    /// Single liveness rule for every path that accepts a refresh token.
    /// Revocation outranks expiry.
    #[must_use]
    pub fn liveness(&self, now: OffsetDateTime) -> Liveness {
        if self.revoked {
            Liveness::Revoked
        } else if self.expires_at <= now {
            Liveness::Expired
        } else {
            Liveness::Live
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewSession {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub admin_id: Uuid,
    pub token_hash: Vec<u8>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub client: ClientMeta,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionScope {
    Tenant(TenantId),
    Admin(Uuid),
}

#[derive(Clone, Debug)]
pub struct Invitation {
    pub token_hash: Vec<u8>,
    pub tenant_id: TenantId,
    pub email: String,
    pub role: Role,
    pub invited_by: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub consumed_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug)]
pub struct ResetRequest {
    pub token_hash: Vec<u8>,
    pub tenant_id: TenantId,
    pub admin_id: Uuid,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub consumed_at: Option<OffsetDateTime>,
}

/// Result of a password reset that was applied.
#[derive(Clone, Debug)]
pub struct ResetApplied {
    pub admin: AdminUser,
    pub revoked_sessions: u64,
}

/// Outcome of consuming a single-use token.
#[derive(Clone, Debug)]
pub enum Consumption<T> {
    Consumed(T),
    NotFound,
    Expired,
    AlreadyConsumed,
}

/// Classify a single-use token row that could not be consumed.
pub(crate) fn classify_unconsumed<T>(
    consumed_at: Option<OffsetDateTime>,
    expires_at: OffsetDateTime,
    now: OffsetDateTime,
) -> Consumption<T> {
    if consumed_at.is_some() {
        Consumption::AlreadyConsumed
    } else if expires_at <= now {
        Consumption::Expired
    } else {
        // Lost the conditional update to a concurrent consumer.
        Consumption::AlreadyConsumed
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    High,
}

impl AuditSeverity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::High => "high",
        }
    }
}

impl FromStr for AuditSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "high" => Ok(Self::High),
            other => Err(format!("unknown audit severity: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum AuditAction {
    #[serde(rename = "auth.login")]
    Login,
    #[serde(rename = "auth.login_failed")]
    LoginFailed,
    #[serde(rename = "auth.logout")]
    Logout,
    #[serde(rename = "session.rotated")]
    SessionRotated,
    #[serde(rename = "session.replay_detected")]
    SessionReplayDetected,
    #[serde(rename = "session.revoked")]
    SessionRevoked,
    #[serde(rename = "session.revoked_others")]
    SessionsRevokedOthers,
    #[serde(rename = "invite.created")]
    InviteCreated,
    #[serde(rename = "invite.accepted")]
    InviteAccepted,
    #[serde(rename = "password_reset.requested")]
    PasswordResetRequested,
    #[serde(rename = "password_reset.confirmed")]
    PasswordResetConfirmed,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "auth.login",
            Self::LoginFailed => "auth.login_failed",
            Self::Logout => "auth.logout",
            Self::SessionRotated => "session.rotated",
            Self::SessionReplayDetected => "session.replay_detected",
            Self::SessionRevoked => "session.revoked",
            Self::SessionsRevokedOthers => "session.revoked_others",
            Self::InviteCreated => "invite.created",
            Self::InviteAccepted => "invite.accepted",
            Self::PasswordResetRequested => "password_reset.requested",
            Self::PasswordResetConfirmed => "password_reset.confirmed",
        }
    }

    #[must_use]
    pub const fn severity(self) -> AuditSeverity {
        match self {
            Self::SessionReplayDetected => AuditSeverity::High,
            _ => AuditSeverity::Info,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth.login" => Ok(Self::Login),
            "auth.login_failed" => Ok(Self::LoginFailed),
            "auth.logout" => Ok(Self::Logout),
            "session.rotated" => Ok(Self::SessionRotated),
            "session.replay_detected" => Ok(Self::SessionReplayDetected),
            "session.revoked" => Ok(Self::SessionRevoked),
            "session.revoked_others" => Ok(Self::SessionsRevokedOthers),
            "invite.created" => Ok(Self::InviteCreated),
            "invite.accepted" => Ok(Self::InviteAccepted),
            "password_reset.requested" => Ok(Self::PasswordResetRequested),
            "password_reset.confirmed" => Ok(Self::PasswordResetConfirmed),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditEntry {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub actor_email: String,
    pub action: AuditAction,
    pub severity: AuditSeverity,
    pub payload: serde_json::Value,
    pub source_address: Option<String>,
    pub recorded_at: OffsetDateTime,
}
