//! Argon2id password hashing, run on the blocking pool.
//!
//! Hashing is intentionally slow, so concurrent jobs are capped by a semaphore
//! and each job (queueing included) is bounded by a timeout. A permit is held
//! until the blocking work actually finishes, even when the caller gave up.

use super::AuthError;
use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher,
    PasswordVerifier, Version,
};
use rand::rngs::OsRng;
use std::{sync::Arc, time::Duration};
use tokio::sync::{OnceCell, Semaphore};
use tracing::warn;

pub struct PasswordHashing {
    permits: Arc<Semaphore>,
    timeout: Duration,
    params: Params,
    // Compared against when the account does not exist, so unknown emails cost the same.
    decoy: OnceCell<String>,
}

impl PasswordHashing {
    #[must_use]
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            timeout,
            params: Params::default(),
            decoy: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Hash a password into a PHC string.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing fails or exceeds the timeout.
    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_string();
        let params = self.params.clone();
        self.run(move || hash_blocking(&password, params)).await
    }

    /// Check `password` against `stored`, or against a decoy hash when there is
    /// no account, so both paths take the same time.
    ///
    /// # Errors
    ///
    /// Returns an error if the job fails or exceeds the timeout.
    pub async fn verify(&self, password: &str, stored: Option<&str>) -> Result<bool, AuthError> {
        let (hash, real) = match stored {
            Some(hash) => (hash.to_string(), true),
            None => (self.decoy_hash().await?.to_string(), false),
        };
        let password = password.to_string();
        let matched = self
            .run(move || Ok(verify_blocking(&password, &hash)))
            .await?;
        Ok(real && matched)
    }

    async fn decoy_hash(&self) -> Result<&str, AuthError> {
        self.decoy
            .get_or_try_init(|| async {
                let params = self.params.clone();
                self.run(move || hash_blocking("decoy-password", params))
                    .await
            })
            .await
            .map(String::as_str)
    }

    async fn run<T, F>(&self, job: F) -> Result<T, AuthError>
    where
        F: FnOnce() -> Result<T, AuthError> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let work = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| AuthError::Internal("password hashing pool closed".to_string()))?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            })
            .await
            .map_err(|err| AuthError::Internal(format!("password hashing task failed: {err}")))?
        };

        if let Ok(result) = tokio::time::timeout(self.timeout, work).await {
            result
        } else {
            warn!("Password hashing timed out after {:?}", self.timeout);
            Err(AuthError::Internal("password hashing timed out".to_string()))
        }
    }
}

fn hash_blocking(password: &str, params: Params) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::Internal("failed to hash password".to_string()))
}

fn verify_blocking(password: &str, stored: &str) -> bool {
    // Parameters come from the PHC string itself.
    PasswordHash::new(stored).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Cheap parameters for tests; never use in production.
#[cfg(test)]
pub(crate) fn test_params() -> Params {
    Params::new(Params::MIN_M_COST, 1, 1, None).unwrap_or_default()
}
