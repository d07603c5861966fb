//! Self-service password reset by emailed single-use link.

use super::{
    bounded, consumed,
    utils::{build_reset_url, generate_token, hash_token, normalize_email},
    AuditRecorder, AuthConfig, AuthError, Clock, CredentialStore,
};
use crate::{
    email::{templates, EmailDispatcher},
    store::{AuditAction, ResetApplied, ResetRequest, Store, TenantId},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

pub struct PasswordResetService {
    store: Arc<dyn Store>,
    credentials: Arc<CredentialStore>,
    audit: Arc<AuditRecorder>,
    mail: EmailDispatcher,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl PasswordResetService {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        credentials: Arc<CredentialStore>,
        audit: Arc<AuditRecorder>,
        mail: EmailDispatcher,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            audit,
            mail,
            clock,
            config,
        }
    }

    /// Start a reset for `email`. Returns the link when one was issued; callers
    /// answer the same way either way so account existence never leaks.
    ///
    /// # Errors
    ///
    /// Returns an error only when storage or token generation fails.
    pub async fn request(
        &self,
        tenant_id: TenantId,
        email: &str,
        source_address: Option<&str>,
    ) -> Result<Option<String>, AuthError> {
        let email = normalize_email(email);
        let Some(admin) = self.credentials.find_by_email(tenant_id, &email).await? else {
            debug!(tenant_id, "Password reset requested for unknown administrator");
            return Ok(None);
        };
        if admin.disabled {
            debug!(admin_id = %admin.id, "Password reset requested for disabled administrator");
            return Ok(None);
        }

        let token = generate_token()?;
        let now = self.clock.now();
        let request = ResetRequest {
            token_hash: hash_token(&token),
            tenant_id,
            admin_id: admin.id,
            issued_at: now,
            expires_at: now + self.config.reset_ttl(),
            consumed_at: None,
        };
        bounded(
            self.config.storage_timeout(),
            self.store.replace_reset_request(&request),
        )
        .await?;

        let url = build_reset_url(self.config.frontend_base_url(), &token);
        self.mail
            .dispatch(templates::password_reset(&admin.email, &url, request.expires_at));
        self.audit
            .record(
                tenant_id,
                &admin.email,
                AuditAction::PasswordResetRequested,
                json!({ "admin_id": admin.id }),
                source_address,
            )
            .await;
        info!(admin_id = %admin.id, "Password reset issued");
        Ok(Some(url))
    }

    /// Consume the token, set the new password and revoke every session of the
    /// administrator.
    ///
    /// # Errors
    ///
    /// [`AuthError::TokenNotFound`], [`AuthError::TokenExpired`] or
    /// [`AuthError::AlreadyConsumed`] when the token cannot be used;
    /// [`AuthError::InvalidInput`] for a weak password.
    pub async fn confirm(
        &self,
        token: &str,
        new_password: &str,
        source_address: Option<&str>,
    ) -> Result<ResetApplied, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::TokenNotFound);
        }
        let password_hash = self.credentials.hash_new_password(new_password).await?;
        let outcome = bounded(
            self.config.storage_timeout(),
            self.store
                .confirm_reset(&hash_token(token.trim()), &password_hash, self.clock.now()),
        )
        .await?;
        let applied = consumed(outcome)?;
        let admin = &applied.admin;

        self.mail.dispatch(templates::password_changed(&admin.email));
        self.audit
            .record(
                admin.tenant_id,
                &admin.email,
                AuditAction::PasswordResetConfirmed,
                json!({
                    "admin_id": admin.id,
                    "revoked_sessions": applied.revoked_sessions,
                }),
                source_address,
            )
            .await;
        info!(
            admin_id = %admin.id,
            revoked_sessions = applied.revoked_sessions,
            "Password reset confirmed"
        );
        Ok(applied)
    }
}
