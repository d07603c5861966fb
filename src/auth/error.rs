use crate::store::StoreError;
use thiserror::Error;

/// Failure kinds of the authentication core.
///
/// The precise variant is kept for logs and the audit trail; the HTTP edge
/// collapses authentication failures into one uniform answer.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("token revoked")]
    TokenRevoked,
    #[error("token replayed")]
    TokenReplayed,
    #[error("token not found")]
    TokenNotFound,
    #[error("token already consumed")]
    AlreadyConsumed,
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => Self::StorageUnavailable(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl AuthError {
    /// Whether the client should treat this as a bad credential or token.
    #[must_use]
    pub const fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::TokenExpired
                | Self::TokenRevoked
                | Self::TokenReplayed
                | Self::TokenNotFound
                | Self::AlreadyConsumed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_store_maps_to_storage_unavailable() {
        let err = AuthError::from(StoreError::Unavailable("pool timed out".to_string()));
        assert!(matches!(err, AuthError::StorageUnavailable(_)));

        let err = AuthError::from(StoreError::Backend("syntax error".to_string()));
        assert!(matches!(err, AuthError::Internal(_)));
    }

    #[test]
    fn token_failures_are_authentication_failures() {
        assert!(AuthError::TokenReplayed.is_authentication_failure());
        assert!(AuthError::InvalidCredentials.is_authentication_failure());
        assert!(!AuthError::Unauthorized.is_authentication_failure());
        assert!(!AuthError::StorageUnavailable(String::new()).is_authentication_failure());
    }
}
