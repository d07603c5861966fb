//! Refresh sessions: creation, single-use rotation and revocation.
//!
//! Rotation flow:
//! 1. Resolve the presented token hash to its session (current or superseded).
//! 2. A superseded hash is a replay: the whole session is revoked.
//! 3. Revoked or expired sessions are refused.
//! 4. The hash is swapped with a compare-and-swap on the expected old hash. A
//!    lost swap is classified from the committed state.

use super::{
    bounded,
    utils::{generate_token, hash_token},
    AuthError, Clock,
};
use crate::store::{
    AdminUser, ClientMeta, Liveness, NewSession, Session, SessionScope, Store,
};
use std::{sync::Arc, time::Duration};
use time::OffsetDateTime;
use tracing::{error, warn};
use uuid::Uuid;

pub const MAX_SESSION_LIST: i64 = 200;

/// A session together with the raw refresh token that currently opens it.
#[derive(Debug)]
pub struct IssuedSession {
    pub refresh_token: String,
    pub session: Session,
}

/// Why a refresh token was refused. Carries the session when one was found
/// so callers can attribute the event.
#[derive(Debug)]
pub enum RotationRejected {
    Unknown,
    Revoked(Session),
    Expired(Session),
    Replayed(Session),
    Failed(AuthError),
}

impl RotationRejected {
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Revoked(session) | Self::Expired(session) | Self::Replayed(session) => {
                Some(session)
            }
            Self::Unknown | Self::Failed(_) => None,
        }
    }
}

impl From<RotationRejected> for AuthError {
    fn from(rejected: RotationRejected) -> Self {
        match rejected {
            RotationRejected::Unknown => Self::TokenNotFound,
            RotationRejected::Revoked(_) => Self::TokenRevoked,
            RotationRejected::Expired(_) => Self::TokenExpired,
            RotationRejected::Replayed(_) => Self::TokenReplayed,
            RotationRejected::Failed(err) => err,
        }
    }
}

/// Shared liveness check for rotation and every other refresh-token path.
///
/// # Errors
///
/// Returns the rejection matching the session state.
pub fn ensure_live(session: Session, now: OffsetDateTime) -> Result<Session, RotationRejected> {
    match session.liveness(now) {
        Liveness::Live => Ok(session),
        Liveness::Revoked => Err(RotationRejected::Revoked(session)),
        Liveness::Expired => Err(RotationRejected::Expired(session)),
    }
}

pub struct SessionStore {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ttl: time::Duration,
    storage_timeout: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        ttl: time::Duration,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            ttl,
            storage_timeout,
        }
    }

    /// Open a session for `admin`. Only the token hash is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be generated or stored.
    pub async fn create(
        &self,
        admin: &AdminUser,
        client: &ClientMeta,
    ) -> Result<IssuedSession, AuthError> {
        let refresh_token = generate_token()?;
        let now = self.clock.now();
        let new_session = NewSession {
            id: Uuid::now_v7(),
            tenant_id: admin.tenant_id,
            admin_id: admin.id,
            token_hash: hash_token(&refresh_token),
            created_at: now,
            expires_at: now + self.ttl,
            client: client.clone(),
        };
        let session = bounded(self.storage_timeout, self.store.insert_session(&new_session)).await?;
        Ok(IssuedSession {
            refresh_token,
            session,
        })
    }

    /// Exchange the presented refresh token for a new one on the same session.
    ///
    /// # Errors
    ///
    /// Returns the reason the token was refused. A replayed token revokes the
    /// session before returning.
    pub async fn rotate(
        &self,
        presented: &str,
        client: &ClientMeta,
    ) -> Result<IssuedSession, RotationRejected> {
        let session = self.resolve(presented).await?;
        self.commit_rotation(&session, presented, client).await
    }

    /// Resolve the presented token to its live session without changing it.
    ///
    /// # Errors
    ///
    /// Same rejections as [`Self::rotate`]. A superseded token revokes the session.
    pub async fn resolve(&self, presented: &str) -> Result<Session, RotationRejected> {
        let presented_hash = hash_token(presented);
        let now = self.clock.now();

        let session = bounded(
            self.storage_timeout,
            self.store.session_by_token_hash(&presented_hash),
        )
        .await
        .map_err(RotationRejected::Failed)?
        .ok_or(RotationRejected::Unknown)?;

        if session.current_token_hash != presented_hash {
            return Err(self.replayed(session, now).await);
        }
        ensure_live(session, now)
    }

    /// Swap the token of a session returned by [`Self::resolve`]. Nothing is
    /// committed unless the swap wins.
    ///
    /// # Errors
    ///
    /// Returns the rejection matching the committed state when the swap lost.
    pub async fn commit_rotation(
        &self,
        session: &Session,
        presented: &str,
        client: &ClientMeta,
    ) -> Result<IssuedSession, RotationRejected> {
        let presented_hash = hash_token(presented);
        let now = self.clock.now();

        let refresh_token = generate_token().map_err(RotationRejected::Failed)?;
        let swapped = bounded(
            self.storage_timeout,
            self.store.swap_session_token(
                session.id,
                &presented_hash,
                &hash_token(&refresh_token),
                now,
                client,
            ),
        )
        .await
        .map_err(RotationRejected::Failed)?;

        if let Some(session) = swapped {
            return Ok(IssuedSession {
                refresh_token,
                session,
            });
        }

        // Lost the swap: classify from what was committed.
        let current = bounded(self.storage_timeout, self.store.session_by_id(session.id))
            .await
            .map_err(RotationRejected::Failed)?
            .ok_or(RotationRejected::Unknown)?;
        if current.revoked {
            return Err(RotationRejected::Revoked(current));
        }
        if current.current_token_hash != presented_hash {
            return Err(self.replayed(current, now).await);
        }
        match ensure_live(current, now) {
            Err(rejected) => Err(rejected),
            Ok(_) => Err(RotationRejected::Failed(AuthError::Internal(
                "session rotation lost without a state change".to_string(),
            ))),
        }
    }

    async fn replayed(&self, session: Session, now: OffsetDateTime) -> RotationRejected {
        warn!(
            session_id = %session.id,
            admin_id = %session.admin_id,
            "Superseded refresh token presented, revoking session"
        );
        if let Err(err) = bounded(
            self.storage_timeout,
            self.store.revoke_session(session.id, now),
        )
        .await
        {
            error!(session_id = %session.id, "Failed to revoke replayed session: {err}");
        }
        RotationRejected::Replayed(session)
    }

    /// Resolve a raw refresh token to its session without rotating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot answer in time.
    pub async fn find_by_token(&self, presented: &str) -> Result<Option<Session>, AuthError> {
        bounded(
            self.storage_timeout,
            self.store.session_by_token_hash(&hash_token(presented)),
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot answer in time.
    pub async fn find(&self, id: Uuid) -> Result<Option<Session>, AuthError> {
        bounded(self.storage_timeout, self.store.session_by_id(id)).await
    }

    /// Idempotent. Returns `true` when this call revoked the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot answer in time.
    pub async fn revoke(&self, id: Uuid) -> Result<bool, AuthError> {
        bounded(
            self.storage_timeout,
            self.store.revoke_session(id, self.clock.now()),
        )
        .await
    }

    /// Revoke every session of `admin_id` other than `keep`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot answer in time.
    pub async fn revoke_all_except(
        &self,
        admin_id: Uuid,
        keep: Option<Uuid>,
    ) -> Result<u64, AuthError> {
        bounded(
            self.storage_timeout,
            self.store
                .revoke_admin_sessions(admin_id, keep, self.clock.now()),
        )
        .await
    }

    /// Newest first, bounded by [`MAX_SESSION_LIST`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot answer in time.
    pub async fn list(&self, scope: SessionScope) -> Result<Vec<Session>, AuthError> {
        bounded(
            self.storage_timeout,
            self.store.list_sessions(scope, MAX_SESSION_LIST),
        )
        .await
    }

    /// Delete sessions revoked or expired before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot answer in time.
    pub async fn purge(&self, cutoff: OffsetDateTime) -> Result<u64, AuthError> {
        bounded(self.storage_timeout, self.store.purge_sessions(cutoff)).await
    }
}
