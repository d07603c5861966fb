//! Lifetimes, timeouts and link targets for the auth flows.

use std::time::Duration;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_INVITE_TTL_SECONDS: i64 = 72 * 60 * 60;
const DEFAULT_RESET_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_AUDIT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_HASH_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_HASH_CONCURRENCY: usize = 4;
const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    access_ttl_seconds: i64,
    session_ttl_seconds: i64,
    invite_ttl_seconds: i64,
    reset_ttl_seconds: i64,
    storage_timeout: Duration,
    audit_timeout: Duration,
    hash_timeout: Duration,
    hash_concurrency: usize,
    min_password_length: usize,
    trust_forwarded_for: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            invite_ttl_seconds: DEFAULT_INVITE_TTL_SECONDS,
            reset_ttl_seconds: DEFAULT_RESET_TTL_SECONDS,
            storage_timeout: Duration::from_millis(DEFAULT_STORAGE_TIMEOUT_MS),
            audit_timeout: Duration::from_millis(DEFAULT_AUDIT_TIMEOUT_MS),
            hash_timeout: Duration::from_millis(DEFAULT_HASH_TIMEOUT_MS),
            hash_concurrency: DEFAULT_HASH_CONCURRENCY,
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
            trust_forwarded_for: false,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_invite_ttl_seconds(mut self, seconds: i64) -> Self {
        self.invite_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_audit_timeout(mut self, timeout: Duration) -> Self {
        self.audit_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_hash_timeout(mut self, timeout: Duration) -> Self {
        self.hash_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_hash_concurrency(mut self, permits: usize) -> Self {
        self.hash_concurrency = permits.max(1);
        self
    }

    #[must_use]
    pub fn with_min_password_length(mut self, length: usize) -> Self {
        self.min_password_length = length;
        self
    }

    /// Take the client address from `X-Forwarded-For`. Only safe behind a
    /// proxy that overwrites the header.
    #[must_use]
    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn access_ttl(&self) -> time::Duration {
        time::Duration::seconds(self.access_ttl_seconds)
    }

    #[must_use]
    pub fn session_ttl(&self) -> time::Duration {
        time::Duration::seconds(self.session_ttl_seconds)
    }

    #[must_use]
    pub fn invite_ttl(&self) -> time::Duration {
        time::Duration::seconds(self.invite_ttl_seconds)
    }

    #[must_use]
    pub fn reset_ttl(&self) -> time::Duration {
        time::Duration::seconds(self.reset_ttl_seconds)
    }

    #[must_use]
    pub fn storage_timeout(&self) -> Duration {
        self.storage_timeout
    }

    #[must_use]
    pub fn audit_timeout(&self) -> Duration {
        self.audit_timeout
    }

    #[must_use]
    pub fn hash_timeout(&self) -> Duration {
        self.hash_timeout
    }

    #[must_use]
    pub fn hash_concurrency(&self) -> usize {
        self.hash_concurrency
    }

    #[must_use]
    pub fn min_password_length(&self) -> usize {
        self.min_password_length
    }

    #[must_use]
    pub fn trust_forwarded_for(&self) -> bool {
        self.trust_forwarded_for
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_back_office_lifetimes() {
        let config = AuthConfig::new("https://maitre.dev/".to_string());
        assert_eq!(config.frontend_base_url(), "https://maitre.dev");
        assert_eq!(config.access_ttl(), time::Duration::minutes(15));
        assert_eq!(config.session_ttl(), time::Duration::days(30));
        assert_eq!(config.invite_ttl(), time::Duration::hours(72));
        assert_eq!(config.reset_ttl(), time::Duration::hours(1));
        assert!(config.cookie_secure());
        assert!(!config.trust_forwarded_for());
    }

    #[test]
    fn builder_overrides() {
        let config = AuthConfig::new("http://localhost:5173".to_string())
            .with_access_ttl_seconds(60)
            .with_session_ttl_seconds(3600)
            .with_hash_concurrency(0)
            .with_storage_timeout(Duration::from_millis(250));
        assert_eq!(config.access_ttl_seconds(), 60);
        assert_eq!(config.session_ttl_seconds(), 3600);
        assert_eq!(config.hash_concurrency(), 1);
        assert_eq!(config.storage_timeout(), Duration::from_millis(250));
        assert!(!config.cookie_secure());
    }
}
