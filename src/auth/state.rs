//! Shared auth state: every component wired to one store, clock and key.

use super::{
    rate_limit::RateLimiter, AuditRecorder, AuthConfig, Clock, CredentialStore,
    InvitationService, PasswordHashing, PasswordResetService, SessionStore, TokenIssuer,
};
use crate::{
    email::{EmailDispatcher, Mailer},
    store::Store,
};
use std::{sync::Arc, time::Duration};

const EMAIL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AuthState {
    pub(super) config: AuthConfig,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) store: Arc<dyn Store>,
    pub(super) issuer: Arc<TokenIssuer>,
    pub(super) credentials: Arc<CredentialStore>,
    pub(super) sessions: SessionStore,
    pub(super) invitations: InvitationService,
    pub(super) resets: PasswordResetService,
    pub(super) audit: Arc<AuditRecorder>,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn Store>,
        issuer: TokenIssuer,
        hashing: PasswordHashing,
        mailer: Arc<dyn Mailer>,
        rate_limiter: Arc<dyn RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let storage_timeout = config.storage_timeout();
        let hashing = Arc::new(hashing);
        let mail = EmailDispatcher::new(mailer, EMAIL_TIMEOUT);
        let audit = Arc::new(AuditRecorder::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.audit_timeout(),
            storage_timeout,
        ));
        let credentials = Arc::new(CredentialStore::new(
            Arc::clone(&store),
            hashing,
            Arc::clone(&clock),
            storage_timeout,
            config.min_password_length(),
        ));
        let sessions = SessionStore::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.session_ttl(),
            storage_timeout,
        );
        let invitations = InvitationService::new(
            Arc::clone(&store),
            Arc::clone(&credentials),
            Arc::clone(&audit),
            mail.clone(),
            Arc::clone(&clock),
            config.clone(),
        );
        let resets = PasswordResetService::new(
            Arc::clone(&store),
            Arc::clone(&credentials),
            Arc::clone(&audit),
            mail,
            Arc::clone(&clock),
            config.clone(),
        );

        Self {
            config,
            clock,
            store,
            issuer: Arc::new(issuer),
            credentials,
            sessions,
            invitations,
            resets,
            audit,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn invitations(&self) -> &InvitationService {
        &self.invitations
    }

    #[must_use]
    pub fn resets(&self) -> &PasswordResetService {
        &self.resets
    }

    #[must_use]
    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}
