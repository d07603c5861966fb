pub mod audit;
pub mod auth;
pub mod health;
pub mod invitations;
pub mod password_reset;
pub mod sessions;

// common helpers for the handlers
use crate::{
    auth::{AuthConfig, AuthState},
    store::ClientMeta,
};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{
        header::{InvalidHeaderValue, COOKIE, USER_AGENT},
        request::Parts,
        HeaderMap, HeaderValue,
    },
};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};

pub(crate) const REFRESH_COOKIE_NAME: &str = "maitre_refresh";

/// Caller address and agent, recorded on sessions and audit entries.
#[derive(Clone, Debug, Default)]
pub struct Client(pub ClientMeta);

#[async_trait]
impl<S> FromRequestParts<S> for Client
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let trust_forwarded_for = parts
            .extensions
            .get::<Arc<AuthState>>()
            .is_some_and(|state| state.config().trust_forwarded_for());
        let connected = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.chars().take(256).collect());

        Ok(Self(ClientMeta {
            address: client_address(&parts.headers, connected, trust_forwarded_for),
            user_agent,
        }))
    }
}

fn client_address(
    headers: &HeaderMap,
    connected: Option<String>,
    trust_forwarded_for: bool,
) -> Option<String> {
    if !trust_forwarded_for {
        return connected;
    }
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .or(connected)
}

pub(crate) fn refresh_cookie_value(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let Some(val) = parts.next() else {
            continue;
        };
        if key == REFRESH_COOKIE_NAME {
            let val = val.trim();
            return (!val.is_empty()).then(|| val.to_string());
        }
    }
    None
}

/// `HttpOnly`, `SameSite=Strict` cookie carrying the refresh token.
pub(crate) fn refresh_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={ttl_seconds}"
    );
    // Only mark cookies secure when the frontend is served over HTTPS.
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_refresh_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{REFRESH_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}
