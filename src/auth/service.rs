//! Flows that span several components: login, refresh, logout and session
//! management on behalf of an authenticated administrator.

use super::{
    sessions::RotationRejected, utils::normalize_email, AccessClaims, AuthError, AuthState,
    IssuedToken, TokenError,
};
use crate::store::{
    AdminUser, AuditAction, AuditEntry, ClientMeta, Role, Session, SessionScope, TenantId,
};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a successful login or refresh.
#[derive(Debug)]
pub struct SignedIn {
    pub admin: AdminUser,
    pub access: IssuedToken,
    pub refresh_token: String,
    pub session: Session,
}

impl AuthState {
    /// Check the password, open a session and mint an access token.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] for any bad email/password/tenant combination.
    pub async fn login(
        &self,
        tenant_id: TenantId,
        email: &str,
        password: &str,
        client: &ClientMeta,
    ) -> Result<SignedIn, AuthError> {
        let source = client.address.as_deref();
        let admin = match self.credentials.authenticate(tenant_id, email, password).await {
            Ok(admin) => admin,
            Err(AuthError::InvalidCredentials) => {
                self.audit
                    .record(
                        tenant_id,
                        &normalize_email(email),
                        AuditAction::LoginFailed,
                        json!({ "reason": "invalid_credentials" }),
                        source,
                    )
                    .await;
                return Err(AuthError::InvalidCredentials);
            }
            Err(err) => return Err(err),
        };

        let opened = self.sessions.create(&admin, client).await?;
        let access = self.mint(&admin)?;
        self.audit
            .record(
                admin.tenant_id,
                &admin.email,
                AuditAction::Login,
                json!({ "session_id": opened.session.id }),
                source,
            )
            .await;
        info!(admin_id = %admin.id, session_id = %opened.session.id, "Administrator signed in");

        Ok(SignedIn {
            admin,
            access,
            refresh_token: opened.refresh_token,
            session: opened.session,
        })
    }

    /// Rotate the refresh token and mint a fresh access token.
    ///
    /// The owner check and the access token are settled before the swap, so
    /// a refresh that fails leaves the presented token current and retryable.
    ///
    /// # Errors
    ///
    /// [`AuthError::TokenNotFound`], [`AuthError::TokenRevoked`],
    /// [`AuthError::TokenExpired`] or [`AuthError::TokenReplayed`].
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientMeta,
    ) -> Result<SignedIn, AuthError> {
        let source = client.address.as_deref();
        let session = match self.sessions.resolve(refresh_token).await {
            Ok(session) => session,
            Err(rejected) => return Err(self.refresh_rejected(rejected, source).await),
        };

        let admin = match self.credentials.find(session.admin_id).await? {
            Some(admin) if !admin.disabled => admin,
            owner => {
                let reason = if owner.is_some() {
                    "owner_disabled"
                } else {
                    "owner_missing"
                };
                warn!(session_id = %session.id, reason, "Session owner cannot sign in, revoking");
                if self.sessions.revoke(session.id).await? {
                    let actor = owner
                        .map_or_else(|| session.admin_id.to_string(), |owner| owner.email);
                    self.audit
                        .record(
                            session.tenant_id,
                            &actor,
                            AuditAction::SessionRevoked,
                            json!({
                                "session_id": session.id,
                                "admin_id": session.admin_id,
                                "reason": reason,
                            }),
                            source,
                        )
                        .await;
                }
                return Err(AuthError::TokenRevoked);
            }
        };
        let access = self.mint(&admin)?;

        let rotated = match self
            .sessions
            .commit_rotation(&session, refresh_token, client)
            .await
        {
            Ok(rotated) => rotated,
            Err(rejected) => return Err(self.refresh_rejected(rejected, source).await),
        };
        self.audit
            .record(
                admin.tenant_id,
                &admin.email,
                AuditAction::SessionRotated,
                json!({
                    "session_id": rotated.session.id,
                    "rotation_count": rotated.session.rotation_count,
                }),
                source,
            )
            .await;

        Ok(SignedIn {
            admin,
            access,
            refresh_token: rotated.refresh_token,
            session: rotated.session,
        })
    }

    async fn refresh_rejected(
        &self,
        rejected: RotationRejected,
        source: Option<&str>,
    ) -> AuthError {
        if let RotationRejected::Replayed(session) = &rejected {
            let actor = self.actor_email(session.admin_id).await;
            self.audit
                .record(
                    session.tenant_id,
                    &actor,
                    AuditAction::SessionReplayDetected,
                    json!({
                        "session_id": session.id,
                        "admin_id": session.admin_id,
                        "rotation_count": session.rotation_count,
                    }),
                    source,
                )
                .await;
        }
        rejected.into()
    }

    /// Revoke the session behind `refresh_token`. Unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error only when storage fails.
    pub async fn logout(&self, refresh_token: &str, client: &ClientMeta) -> Result<(), AuthError> {
        let Some(session) = self.sessions.find_by_token(refresh_token).await? else {
            return Ok(());
        };
        if self.sessions.revoke(session.id).await? {
            let actor = self.actor_email(session.admin_id).await;
            self.audit
                .record(
                    session.tenant_id,
                    &actor,
                    AuditAction::Logout,
                    json!({ "session_id": session.id }),
                    client.address.as_deref(),
                )
                .await;
        }
        Ok(())
    }

    /// Verify an access token against the current clock.
    ///
    /// # Errors
    ///
    /// [`AuthError::TokenExpired`] once expired, [`AuthError::InvalidCredentials`]
    /// for anything else that does not verify.
    pub fn verify(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        self.issuer
            .verify(access_token, self.clock.now())
            .map_err(|err| match err {
                TokenError::Expired => AuthError::TokenExpired,
                _ => AuthError::InvalidCredentials,
            })
    }

    /// Owners see the whole tenant, everyone else their own sessions.
    ///
    /// # Errors
    ///
    /// Returns an error when storage fails.
    pub async fn list_sessions(&self, claims: &AccessClaims) -> Result<Vec<Session>, AuthError> {
        let scope = if claims.role == Role::Owner {
            SessionScope::Tenant(claims.tid)
        } else {
            SessionScope::Admin(claims.sub)
        };
        let mut sessions = self.sessions.list(scope).await?;
        sessions.retain(|session| session.tenant_id == claims.tid);
        Ok(sessions)
    }

    /// Revoke one session visible to `claims`. Returns `false` when no such
    /// session is visible; revoking twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error when storage fails.
    pub async fn revoke_session(
        &self,
        claims: &AccessClaims,
        session_id: Uuid,
        source_address: Option<&str>,
    ) -> Result<bool, AuthError> {
        let visible = self.sessions.find(session_id).await?.filter(|session| {
            session.tenant_id == claims.tid
                && (claims.role == Role::Owner || session.admin_id == claims.sub)
        });
        let Some(session) = visible else {
            return Ok(false);
        };

        if self.sessions.revoke(session.id).await? {
            self.audit
                .record(
                    claims.tid,
                    &claims.email,
                    AuditAction::SessionRevoked,
                    json!({ "session_id": session.id, "admin_id": session.admin_id }),
                    source_address,
                )
                .await;
        }
        Ok(true)
    }

    /// Revoke every session of the caller except the one behind `refresh_token`.
    ///
    /// # Errors
    ///
    /// Returns an error when storage fails.
    pub async fn revoke_other_sessions(
        &self,
        claims: &AccessClaims,
        refresh_token: Option<&str>,
        source_address: Option<&str>,
    ) -> Result<u64, AuthError> {
        let keep = match refresh_token {
            Some(token) => self
                .sessions
                .find_by_token(token)
                .await?
                .filter(|session| session.admin_id == claims.sub)
                .map(|session| session.id),
            None => None,
        };
        let revoked = self.sessions.revoke_all_except(claims.sub, keep).await?;
        self.audit
            .record(
                claims.tid,
                &claims.email,
                AuditAction::SessionsRevokedOthers,
                json!({ "kept_session_id": keep, "revoked_count": revoked }),
                source_address,
            )
            .await;
        Ok(revoked)
    }

    /// Owner-only audit page for the caller's tenant.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthorized`] for non-owners.
    pub async fn audit_page(
        &self,
        claims: &AccessClaims,
        before: Option<OffsetDateTime>,
        limit: Option<i64>,
    ) -> Result<Vec<AuditEntry>, AuthError> {
        if claims.role != Role::Owner {
            return Err(AuthError::Unauthorized);
        }
        self.audit.list(claims.tid, before, limit).await
    }

    fn mint(&self, admin: &AdminUser) -> Result<IssuedToken, AuthError> {
        self.issuer
            .issue(admin, self.config.access_ttl(), self.clock.now())
            .map_err(|err| AuthError::Internal(format!("failed to issue access token: {err}")))
    }

    async fn actor_email(&self, admin_id: Uuid) -> String {
        match self.credentials.find(admin_id).await {
            Ok(Some(admin)) => admin.email,
            _ => admin_id.to_string(),
        }
    }
}
