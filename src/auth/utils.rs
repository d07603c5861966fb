//! Email normalization plus opaque token generation and hashing.

use super::AuthError;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Fresh high-entropy token for refresh cookies, invitation and reset links.
/// The raw value only ever leaves through the response; storage keeps [`hash_token`].
pub(crate) fn generate_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| AuthError::Internal(format!("failed to generate token: {err}")))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

pub(crate) fn build_invite_url(frontend_base_url: &str, token: &str, tenant_id: i64) -> String {
    format!("{frontend_base_url}/invite/accept?token={token}&tenant={tenant_id}")
}

pub(crate) fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    format!("{frontend_base_url}/password-reset/confirm?token={token}")
}
