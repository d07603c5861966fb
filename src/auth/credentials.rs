//! Administrator identities and password checks.

use super::{
    bounded,
    utils::{normalize_email, valid_email},
    AuthError, Clock, PasswordHashing,
};
use crate::store::{AdminUser, NewAdmin, Role, Store, TenantId};
use std::{sync::Arc, time::Duration};
use tracing::debug;
use uuid::Uuid;

pub struct CredentialStore {
    store: Arc<dyn Store>,
    hashing: Arc<PasswordHashing>,
    clock: Arc<dyn Clock>,
    storage_timeout: Duration,
    min_password_length: usize,
}

impl CredentialStore {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        hashing: Arc<PasswordHashing>,
        clock: Arc<dyn Clock>,
        storage_timeout: Duration,
        min_password_length: usize,
    ) -> Self {
        Self {
            store,
            hashing,
            clock,
            storage_timeout,
            min_password_length,
        }
    }

    /// Resolve and check a login attempt.
    ///
    /// Unknown accounts, disabled accounts and wrong passwords all fail with
    /// [`AuthError::InvalidCredentials`] after the same amount of hashing work.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] or a storage/hashing failure.
    pub async fn authenticate(
        &self,
        tenant_id: TenantId,
        email: &str,
        password: &str,
    ) -> Result<AdminUser, AuthError> {
        let email = normalize_email(email);
        let admin = bounded(
            self.storage_timeout,
            self.store.admin_by_email(tenant_id, &email),
        )
        .await?;

        let matched = self
            .hashing
            .verify(password, admin.as_ref().map(|a| a.password_hash.as_str()))
            .await?;

        match admin {
            Some(admin) if matched && !admin.disabled => Ok(admin),
            Some(admin) if admin.disabled => {
                debug!(admin_id = %admin.id, "Login attempt for disabled administrator");
                Err(AuthError::InvalidCredentials)
            }
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot answer in time.
    pub async fn find(&self, id: Uuid) -> Result<Option<AdminUser>, AuthError> {
        bounded(self.storage_timeout, self.store.admin_by_id(id)).await
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot answer in time.
    pub async fn find_by_email(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<AdminUser>, AuthError> {
        let email = normalize_email(email);
        bounded(
            self.storage_timeout,
            self.store.admin_by_email(tenant_id, &email),
        )
        .await
    }

    /// Create or replace an administrator directly (operator seeding).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidInput`] for a malformed email or weak password.
    pub async fn upsert(
        &self,
        tenant_id: TenantId,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<AdminUser, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidInput("invalid email address"));
        }
        let password_hash = self.hash_new_password(password).await?;
        let admin = NewAdmin {
            tenant_id,
            email,
            password_hash,
            role,
            permissions: role.default_permissions(),
        };
        bounded(
            self.storage_timeout,
            self.store.upsert_admin(&admin, self.clock.now()),
        )
        .await
    }

    /// Validate a password chosen by a user and hash it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidInput`] when the password is too short.
    pub async fn hash_new_password(&self, password: &str) -> Result<String, AuthError> {
        if password.chars().count() < self.min_password_length {
            return Err(AuthError::InvalidInput("password is too short"));
        }
        self.hashing.hash(password).await
    }
}
