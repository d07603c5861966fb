//! Owner-issued, single-use invitations for new administrators.

use super::{
    bounded, consumed,
    utils::{build_invite_url, generate_token, hash_token, normalize_email, valid_email},
    AccessClaims, AuditRecorder, AuthConfig, AuthError, Clock, CredentialStore,
};
use crate::{
    email::{templates, EmailDispatcher},
    store::{AdminUser, AuditAction, Invitation, Role, Store, TenantId},
};
use serde_json::json;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;

/// What the inviter gets back. The raw token only travels inside `url`.
#[derive(Debug)]
pub struct InviteLink {
    pub url: String,
    pub email: String,
    pub role: Role,
    pub expires_at: OffsetDateTime,
}

pub struct InvitationService {
    store: Arc<dyn Store>,
    credentials: Arc<CredentialStore>,
    audit: Arc<AuditRecorder>,
    mail: EmailDispatcher,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl InvitationService {
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

    /// Invite `email` into `tenant_id` with `role`, replacing any outstanding
    /// invitation for the same address.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Unauthorized`] unless the inviter is an owner of `tenant_id`,
    /// - [`AuthError::InvalidInput`] for a malformed email.
    pub async fn create(
        &self,
        tenant_id: TenantId,
        inviter: &AccessClaims,
        email: &str,
        role: Role,
        source_address: Option<&str>,
    ) -> Result<InviteLink, AuthError> {
        if inviter.role != Role::Owner || inviter.tid != tenant_id {
            return Err(AuthError::Unauthorized);
        }
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidInput("invalid email address"));
        }

        let token = generate_token()?;
        let now = self.clock.now();
        let invitation = Invitation {
            token_hash: hash_token(&token),
            tenant_id,
            email: email.clone(),
            role,
            invited_by: inviter.email.clone(),
            issued_at: now,
            expires_at: now + self.config.invite_ttl(),
            consumed_at: None,
        };
        bounded(
            self.config.storage_timeout(),
            self.store.replace_invitation(&invitation),
        )
        .await?;

        let url = build_invite_url(self.config.frontend_base_url(), &token, tenant_id);
        self.mail.dispatch(templates::invitation(
            &email,
            &url,
            role.as_str(),
            &inviter.email,
            invitation.expires_at,
        ));
        self.audit
            .record(
                tenant_id,
                &inviter.email,
                AuditAction::InviteCreated,
                json!({
                    "email": email,
                    "role": role.as_str(),
                    "expires_at": invitation.expires_at.unix_timestamp(),
                }),
                source_address,
            )
            .await;
        info!(tenant_id, role = %role, "Invitation created");

        Ok(InviteLink {
            url,
            email,
            role,
            expires_at: invitation.expires_at,
        })
    }

    /// Consume the invitation and create (or re-enable) the administrator.
    /// Sessions an existing administrator already had are revoked.
    ///
    /// # Errors
    ///
    /// [`AuthError::TokenNotFound`], [`AuthError::TokenExpired`] or
    /// [`AuthError::AlreadyConsumed`] when the token cannot be used.
    pub async fn accept(
        &self,
        token: &str,
        password: &str,
        source_address: Option<&str>,
    ) -> Result<AdminUser, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::TokenNotFound);
        }
        // Hash before consuming so a rejected password leaves the invite usable.
        let password_hash = self.credentials.hash_new_password(password).await?;
        let outcome = bounded(
            self.config.storage_timeout(),
            self.store
                .accept_invitation(&hash_token(token.trim()), &password_hash, self.clock.now()),
        )
        .await?;
        let admin = consumed(outcome)?;

        self.mail
            .dispatch(templates::account_ready(&admin.email, admin.role.as_str()));
        self.audit
            .record(
                admin.tenant_id,
                &admin.email,
                AuditAction::InviteAccepted,
                json!({ "admin_id": admin.id, "role": admin.role.as_str() }),
                source_address,
            )
            .await;
        info!(admin_id = %admin.id, tenant_id = admin.tenant_id, "Invitation accepted");
        Ok(admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::testing::{harness, Harness},
        store::ClientMeta,
    };

    fn token_from(url: &str) -> &str {
        url.split("token=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn owner_invites_and_invitee_accepts_once() -> Result<(), AuthError> {
        let Harness {
            state,
            mut inbox,
            store,
            ..
        } = harness().await?;
        let owner = state.owner_claims().await?;

        let link = state
            .invitations()
            .create(1, &owner, "Chef@Bistro.fr", Role::Chef, None)
            .await?;
        assert!(link.url.starts_with("https://app.maitre.dev/invite/accept?token="));
        assert!(link.url.ends_with("&tenant=1"));
        let sent = inbox.recv().await;
        assert_eq!(sent.map(|m| m.to), Some("chef@bistro.fr".to_string()));

        let admins_before = store.admin_count().await;
        let admin = state
            .invitations()
            .accept(token_from(&link.url), "chef-password", None)
            .await?;
        assert_eq!(admin.email, "chef@bistro.fr");
        assert_eq!(admin.role, Role::Chef);
        assert_eq!(store.admin_count().await, admins_before + 1);

        let again = state
            .invitations()
            .accept(token_from(&link.url), "chef-password", None)
            .await;
        assert!(matches!(again, Err(AuthError::AlreadyConsumed)));
        assert_eq!(store.admin_count().await, admins_before + 1);
        Ok(())
    }

    #[tokio::test]
    async fn reinvite_replaces_previous_token() -> Result<(), AuthError> {
        let Harness { state, .. } = harness().await?;
        let owner = state.owner_claims().await?;
        let first = state
            .invitations()
            .create(1, &owner, "chef@bistro.fr", Role::Chef, None)
            .await?;
        let second = state
            .invitations()
            .create(1, &owner, "chef@bistro.fr", Role::Chef, None)
            .await?;

        let stale = state
            .invitations()
            .accept(token_from(&first.url), "chef-password", None)
            .await;
        assert!(matches!(stale, Err(AuthError::TokenNotFound)));
        assert!(state
            .invitations()
            .accept(token_from(&second.url), "chef-password", None)
            .await
            .is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn only_owners_of_the_tenant_may_invite() -> Result<(), AuthError> {
        let Harness { state, .. } = harness().await?;
        let mut claims = state.owner_claims().await?;

        let other_tenant = state
            .invitations()
            .create(2, &claims, "chef@bistro.fr", Role::Chef, None)
            .await;
        assert!(matches!(other_tenant, Err(AuthError::Unauthorized)));

        claims.role = Role::Chef;
        let chef = state
            .invitations()
            .create(1, &claims, "chef@bistro.fr", Role::Chef, None)
            .await;
        assert!(matches!(chef, Err(AuthError::Unauthorized)));
        Ok(())
    }

    #[tokio::test]
    async fn expired_invitation_is_refused() -> Result<(), AuthError> {
        let Harness { state, clock, .. } = harness().await?;
        let owner = state.owner_claims().await?;
        let link = state
            .invitations()
            .create(1, &owner, "chef@bistro.fr", Role::Chef, None)
            .await?;
        clock.advance(time::Duration::hours(72));

        let result = state
            .invitations()
            .accept(token_from(&link.url), "chef-password", None)
            .await;
        assert!(matches!(result, Err(AuthError::TokenExpired)));
        Ok(())
    }

    #[tokio::test]
    async fn weak_password_leaves_invitation_usable() -> Result<(), AuthError> {
        let Harness { state, .. } = harness().await?;
        let owner = state.owner_claims().await?;
        let link = state
            .invitations()
            .create(1, &owner, "chef@bistro.fr", Role::Chef, None)
            .await?;

        let weak = state
            .invitations()
            .accept(token_from(&link.url), "short", None)
            .await;
        assert!(matches!(weak, Err(AuthError::InvalidInput(_))));
        assert!(state
            .invitations()
            .accept(token_from(&link.url), "long-enough", None)
            .await
            .is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn accepting_for_an_existing_account_ends_its_sessions() -> Result<(), AuthError> {
        let Harness { state, .. } = harness().await?;
        let owner = state.owner_claims().await?;
        let client = ClientMeta::default();
        state
            .credentials()
            .upsert(1, "chef@bistro.fr", "old-chef-password", Role::Chef)
            .await?;
        let chef = state
            .login(1, "chef@bistro.fr", "old-chef-password", &client)
            .await?;

        let link = state
            .invitations()
            .create(1, &owner, "chef@bistro.fr", Role::Owner, None)
            .await?;
        let admin = state
            .invitations()
            .accept(token_from(&link.url), "new-chef-password", None)
            .await?;
        assert_eq!(admin.id, chef.admin.id);
        assert_eq!(admin.role, Role::Owner);

        assert!(matches!(
            state.refresh(&chef.refresh_token, &client).await,
            Err(AuthError::TokenRevoked)
        ));
        Ok(())
    }
}
