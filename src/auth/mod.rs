//! Authentication core: credentials, access tokens, refresh sessions,
//! invitations, password resets and the audit trail.
//!
//! Flow Overview:
//! 1. `login` checks the password and opens a session; the client gets a
//!    short-lived access token and a refresh token (cookie).
//! 2. Protected requests carry the access token; it is verified without storage.
//! 3. `refresh` rotates the refresh token on the same session. Presenting a
//!    superseded refresh token revokes the whole session.

mod audit;
mod clock;
mod config;
mod credentials;
mod error;
mod invitations;
mod password;
mod password_reset;
pub mod rate_limit;
mod service;
pub mod sessions;
mod state;
mod token;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{AuditRecorder, MAX_AUDIT_PAGE};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use credentials::CredentialStore;
pub use error::AuthError;
pub use invitations::{InvitationService, InviteLink};
pub use password::PasswordHashing;
pub use password_reset::PasswordResetService;
pub use service::SignedIn;
pub use sessions::{IssuedSession, SessionStore, MAX_SESSION_LIST};
pub use state::AuthState;
pub use token::{AccessClaims, IssuedToken, TokenError, TokenIssuer};

use crate::store::{Consumption, StoreError};
use std::{future::Future, time::Duration};

/// Run a storage call under `limit`; a timeout counts as unavailable storage.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(AuthError::from),
        Err(_) => Err(AuthError::StorageUnavailable(format!(
            "storage call timed out after {limit:?}"
        ))),
    }
}

pub(crate) fn consumed<T>(outcome: Consumption<T>) -> Result<T, AuthError> {
    match outcome {
        Consumption::Consumed(value) => Ok(value),
        Consumption::NotFound => Err(AuthError::TokenNotFound),
        Consumption::Expired => Err(AuthError::TokenExpired),
        Consumption::AlreadyConsumed => Err(AuthError::AlreadyConsumed),
    }
}
