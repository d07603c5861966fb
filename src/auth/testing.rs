//! In-memory wiring shared by the auth unit tests.

use super::{
    password::test_params, rate_limit::NoopRateLimiter, AccessClaims, AuthConfig, AuthError,
    AuthState, ManualClock, PasswordHashing, TokenIssuer,
};
use crate::{
    email::{testing::RecordingMailer, EmailMessage},
    store::{MemoryStore, Role},
};
use std::{sync::Arc, time::Duration};
use time::macros::datetime;
use tokio::sync::mpsc::UnboundedReceiver;

pub(crate) const OWNER_EMAIL: &str = "owner@bistro.fr";
pub(crate) const OWNER_PASSWORD: &str = "owner-password";

pub(crate) struct Harness {
    pub(crate) state: AuthState,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) inbox: UnboundedReceiver<EmailMessage>,
}

/// Tenant 1 with one owner, a manual clock and a recording mailer.
pub(crate) async fn harness() -> Result<Harness, AuthError> {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(datetime!(2026-03-01 12:00 UTC)));
    let (mailer, inbox) = RecordingMailer::new();
    let issuer = TokenIssuer::from_seed(&[7u8; 32])
        .map_err(|err| AuthError::Internal(err.to_string()))?;
    let state = AuthState::new(
        AuthConfig::new("https://app.maitre.dev/".to_string()),
        store.clone(),
        issuer,
        PasswordHashing::new(4, Duration::from_secs(10)).with_params(test_params()),
        Arc::new(mailer),
        Arc::new(NoopRateLimiter),
        clock.clone(),
    );
    state
        .credentials()
        .upsert(1, OWNER_EMAIL, OWNER_PASSWORD, Role::Owner)
        .await?;
    Ok(Harness {
        state,
        store,
        clock,
        inbox,
    })
}

impl AuthState {
    /// Claims of the seeded owner without going through login.
    pub(crate) async fn owner_claims(&self) -> Result<AccessClaims, AuthError> {
        let owner = self
            .credentials()
            .find_by_email(1, OWNER_EMAIL)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let issued = self
            .issuer()
            .issue(&owner, self.config().access_ttl(), self.clock().now())
            .map_err(|err| AuthError::Internal(err.to_string()))?;
        Ok(issued.claims)
    }
}
