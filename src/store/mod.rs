//! Storage seam for administrators, sessions, single-use tokens and the audit log.
//!
//! Every mutation that guards a security invariant is a single conditional
//! operation in the backend: session rotation is a compare-and-swap on the
//! stored token hash, and token consumption is an update filtered on
//! `consumed_at IS NULL`. Callers never read, decide, then write.

mod memory;
pub mod models;
mod postgres;

pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────── Administrators ─────────────────────────────────

    async fn admin_by_email(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<AdminUser>, StoreError>;

    async fn admin_by_id(&self, id: Uuid) -> Result<Option<AdminUser>, StoreError>;

    /// Create the administrator or, when (tenant, email) exists, replace its
    /// password, role and permissions and re-enable it.
    async fn upsert_admin(
        &self,
        admin: &NewAdmin,
        now: OffsetDateTime,
    ) -> Result<AdminUser, StoreError>;

    // ───────────────────────────────── Sessions ─────────────────────────────────

    async fn insert_session(&self, session: &NewSession) -> Result<Session, StoreError>;

    /// Resolve a token hash to its session, whether it is the current hash or
    /// one the session held before a rotation.
    async fn session_by_token_hash(&self, token_hash: &[u8])
        -> Result<Option<Session>, StoreError>;

    async fn session_by_id(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Replace the current hash iff it still equals `expected_hash` and the
    /// session is neither revoked nor expired at `now`. Returns `None` when
    /// the swap lost.
    async fn swap_session_token(
        &self,
        id: Uuid,
        expected_hash: &[u8],
        new_hash: &[u8],
        now: OffsetDateTime,
        client: &ClientMeta,
    ) -> Result<Option<Session>, StoreError>;

    /// Mark a session revoked. Returns `true` when this call revoked it.
    async fn revoke_session(&self, id: Uuid, now: OffsetDateTime) -> Result<bool, StoreError>;

    /// Revoke every live session of `admin_id` except `keep`.
    async fn revoke_admin_sessions(
        &self,
        admin_id: Uuid,
        keep: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError>;

    /// Newest first.
    async fn list_sessions(
        &self,
        scope: SessionScope,
        limit: i64,
    ) -> Result<Vec<Session>, StoreError>;

    /// Delete sessions revoked or expired before `cutoff`.
    async fn purge_sessions(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError>;

    // ───────────────────────────────── Invitations ─────────────────────────────────

    /// Store a new invitation, dropping any outstanding one for the same (tenant, email).
    async fn replace_invitation(&self, invitation: &Invitation) -> Result<(), StoreError>;

    /// Consume the invitation, upsert its administrator and revoke any session
    /// the administrator already had, in one transaction.
    async fn accept_invitation(
        &self,
        token_hash: &[u8],
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Consumption<AdminUser>, StoreError>;

    // ───────────────────────────────── Password resets ─────────────────────────────────

    /// Store a new reset request, consuming any outstanding one for the same administrator.
    async fn replace_reset_request(&self, request: &ResetRequest) -> Result<(), StoreError>;

    /// Consume the request, replace the password hash and revoke every session
    /// of the administrator in one transaction.
    async fn confirm_reset(
        &self,
        token_hash: &[u8],
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Consumption<ResetApplied>, StoreError>;

    // ───────────────────────────────── Audit ─────────────────────────────────

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Newest first, strictly older than `before` when given.
    async fn list_audit(
        &self,
        tenant_id: TenantId,
        before: Option<OffsetDateTime>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, StoreError>;

    // ───────────────────────────────── Health ─────────────────────────────────

    async fn ping(&self) -> Result<(), StoreError>;
}
