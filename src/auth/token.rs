//! Access tokens: PASETO `v4.public`, Ed25519 signed.
//!
//! The footer carries the PASERK id (`kid`) of the verifying key so a rotated
//! key is rejected before signature work. Claims are a fixed struct; nothing
//! else is accepted in the payload.

use crate::store::{AdminUser, Role, TenantId};
use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use ed25519_dalek::{Signer, SigningKey};
use pasetors::{
    errors::Error as PasetorsError,
    footer::Footer,
    keys::AsymmetricPublicKey,
    paserk::{FormatAsPaserk, Id},
    token::UntrustedToken,
    version4::{PublicToken, V4},
    Public,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

const HEADER: &str = "v4.public.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
    #[error("invalid signing key")]
    SigningKey,
    #[error("failed to encode token")]
    Encode,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub tid: TenantId,
    pub email: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub iat: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub exp: OffsetDateTime,
}

#[derive(Serialize)]
struct TokenFooter<'a> {
    kid: &'a str,
}

#[derive(Debug)]
pub struct IssuedToken {
    pub token: String,
    pub claims: AccessClaims,
}

pub struct TokenIssuer {
    signing_key: SigningKey,
    public_key: AsymmetricPublicKey<V4>,
    kid: String,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Build an issuer from a raw Ed25519 seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived public key cannot be expressed as a PASERK.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, TokenError> {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key().to_bytes();
        let public_key = AsymmetricPublicKey::<V4>::from(verifying_key.as_slice())
            .map_err(|_| TokenError::SigningKey)?;
        let kid = format_kid(&public_key)?;
        Ok(Self {
            signing_key,
            public_key,
            kid,
        })
    }

    /// Build an issuer from a standard base64 encoded 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not base64 or not 32 bytes long.
    pub fn from_base64_seed(encoded: &str) -> Result<Self, TokenError> {
        let raw = Base64::decode_vec(encoded.trim()).map_err(|_| TokenError::SigningKey)?;
        let seed: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| TokenError::SigningKey)?;
        Self::from_seed(&seed)
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Mint an access token for `subject` valid for `ttl` from `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be encoded.
    pub fn issue(
        &self,
        subject: &AdminUser,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Result<IssuedToken, TokenError> {
        let claims = AccessClaims {
            sub: subject.id,
            tid: subject.tenant_id,
            email: subject.email.clone(),
            role: subject.role,
            iat: now,
            exp: now + ttl,
        };
        let payload = serde_json::to_vec(&claims).map_err(|_| TokenError::Encode)?;
        let footer =
            serde_json::to_vec(&TokenFooter { kid: &self.kid }).map_err(|_| TokenError::Encode)?;
        let pre_auth = pae(&[HEADER.as_bytes(), &payload, &footer, b""])?;
        let signature = self.signing_key.sign(&pre_auth);
        Ok(IssuedToken {
            token: build_token(&payload, &footer, &signature.to_bytes()),
            claims,
        })
    }

    /// Verify signature, key id and expiry.
    ///
    /// # Errors
    ///
    /// - [`TokenError::Malformed`] when the token cannot be parsed,
    /// - [`TokenError::Invalid`] for a foreign key or bad signature,
    /// - [`TokenError::Expired`] once `exp` is reached.
    pub fn verify(&self, token: &str, now: OffsetDateTime) -> Result<AccessClaims, TokenError> {
        let untrusted =
            UntrustedToken::<Public, V4>::try_from(token).map_err(|err| map_paseto_error(&err))?;
        let kid = footer_kid(untrusted.untrusted_footer())?;
        if kid != self.kid {
            return Err(TokenError::Invalid);
        }

        let trusted = PublicToken::verify(&self.public_key, &untrusted, None, None)
            .map_err(|err| map_paseto_error(&err))?;
        let claims: AccessClaims =
            serde_json::from_str(trusted.payload()).map_err(|_| TokenError::Malformed)?;

        if claims.iat > now || claims.exp <= claims.iat {
            return Err(TokenError::Invalid);
        }
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

fn build_token(payload: &[u8], footer: &[u8], signature: &[u8; 64]) -> String {
    let mut message = Vec::with_capacity(payload.len() + signature.len());
    message.extend_from_slice(payload);
    message.extend_from_slice(signature);
    let body_b64 = Base64UrlUnpadded::encode_string(&message);
    let footer_b64 = Base64UrlUnpadded::encode_string(footer);
    format!("{HEADER}{body_b64}.{footer_b64}")
}

fn footer_kid(footer_bytes: &[u8]) -> Result<String, TokenError> {
    if footer_bytes.is_empty() {
        return Err(TokenError::Malformed);
    }
    let mut footer = Footer::new();
    footer
        .parse_bytes(footer_bytes)
        .map_err(|_| TokenError::Malformed)?;
    footer
        .get_claim("kid")
        .and_then(|value| value.as_str())
        .map(ToString::to_string)
        .ok_or(TokenError::Malformed)
}

fn format_kid(key: &AsymmetricPublicKey<V4>) -> Result<String, TokenError> {
    let id = Id::from(key);
    let mut kid = String::new();
    id.fmt(&mut kid).map_err(|_| TokenError::SigningKey)?;
    Ok(kid)
}

// Pre-authentication encoding, PASETO section 2.2.1.
fn pae(pieces: &[&[u8]]) -> Result<Vec<u8>, TokenError> {
    let count = u64::try_from(pieces.len()).map_err(|_| TokenError::Encode)?;
    let mut out = Vec::new();
    out.extend_from_slice(&le64(count));
    for piece in pieces {
        let len = u64::try_from(piece.len()).map_err(|_| TokenError::Encode)?;
        out.extend_from_slice(&le64(len));
        out.extend_from_slice(piece);
    }
    Ok(out)
}

fn le64(value: u64) -> [u8; 8] {
    // The most significant bit must be cleared.
    (value & (u64::MAX >> 1)).to_le_bytes()
}

fn map_paseto_error(err: &PasetorsError) -> TokenError {
    match err {
        PasetorsError::TokenValidation => TokenError::Invalid,
        _ => TokenError::Malformed,
    }
}
