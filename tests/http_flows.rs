//! End-to-end HTTP flows against the in-memory store.
//!
//! Each test builds the full router with a manual clock and a mailer that
//! hands messages back to the test, then drives it with `oneshot`.

use anyhow::{anyhow, Context, Result};
use argon2::Params;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE},
        Request, Response, StatusCode,
    },
    Router,
};
use maitre::{
    api,
    auth::{
        rate_limit::{NoopRateLimiter, RateLimiter, WindowRateLimiter},
        AuthConfig, AuthState, ManualClock, PasswordHashing, TokenIssuer,
    },
    email::{DeliveryError, EmailMessage, Mailer},
    store::{MemoryStore, Role},
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use time::macros::datetime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tower::ServiceExt;

const OWNER_EMAIL: &str = "owner@bistro.fr";
const OWNER_PASSWORD: &str = "owner-password";

struct ChannelMailer(UnboundedSender<EmailMessage>);

#[async_trait]
impl Mailer for ChannelMailer {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        self.0
            .send(message.clone())
            .map_err(|err| DeliveryError::Transport(err.to_string()))
    }
}

struct App {
    router: Router,
    clock: Arc<ManualClock>,
    inbox: UnboundedReceiver<EmailMessage>,
}

impl App {
    async fn new() -> Result<Self> {
        Self::with_rate_limiter(Arc::new(NoopRateLimiter)).await
    }

    async fn with_rate_limiter(rate_limiter: Arc<dyn RateLimiter>) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(datetime!(2026-03-01 12:00 UTC)));
        let (sender, inbox) = mpsc::unbounded_channel();
        let params = Params::new(Params::MIN_M_COST, 1, 1, None)
            .map_err(|err| anyhow!("argon2 params: {err}"))?;
        let state = Arc::new(AuthState::new(
            AuthConfig::new("https://app.maitre.dev".to_string()),
            store,
            TokenIssuer::from_seed(&[42u8; 32])?,
            PasswordHashing::new(2, Duration::from_secs(10)).with_params(params),
            Arc::new(ChannelMailer(sender)),
            rate_limiter,
            clock.clone(),
        ));
        state
            .credentials()
            .upsert(1, OWNER_EMAIL, OWNER_PASSWORD, Role::Owner)
            .await?;

        Ok(Self {
            router: api::router(state)?,
            clock,
            inbox,
        })
    }

    async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    async fn login(&self, email: &str, password: &str) -> Result<Response<Body>> {
        self.send(post_json(
            "/v1/auth/login",
            &json!({ "tenant_id": 1, "email": email, "password": password }),
        )?)
        .await
    }

    /// Log in and return (access token, refresh cookie value).
    async fn sign_in(&self, email: &str, password: &str) -> Result<(String, String)> {
        let response = self.login(email, password).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = refresh_cookie(&response).context("login sets the refresh cookie")?;
        let body = json_body(response).await?;
        let access = body["access_token"]
            .as_str()
            .context("access token in body")?
            .to_string();
        Ok((access, cookie))
    }

    async fn refresh(&self, cookie: &str) -> Result<Response<Body>> {
        self.send(
            Request::post("/v1/auth/refresh")
                .header(COOKIE, format!("maitre_refresh={cookie}"))
                .body(Body::empty())?,
        )
        .await
    }

    async fn next_email(&mut self) -> Result<EmailMessage> {
        tokio::time::timeout(Duration::from_secs(2), self.inbox.recv())
            .await?
            .context("mailer channel closed")
    }
}

fn post_json(uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?)
}

fn with_bearer(mut request: Request<Body>, token: &str) -> Result<Request<Body>> {
    request
        .headers_mut()
        .insert(AUTHORIZATION, format!("Bearer {token}").parse()?);
    Ok(request)
}

fn refresh_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.strip_prefix("maitre_refresh="))
        .and_then(|rest| rest.split(';').next())
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

async fn json_body(response: Response<Body>) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn token_in(message: &EmailMessage) -> Result<String> {
    let start = message
        .body
        .find("token=")
        .context("no token in email body")?
        + "token=".len();
    Ok(message.body[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect())
}

#[tokio::test]
async fn health_reports_storage() -> Result<()> {
    let app = App::new().await?;
    let response = app
        .send(Request::get("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));
    assert!(response.headers().contains_key("x-request-id"));
    let body = json_body(response).await?;
    assert_eq!(body["storage"], "ok");
    assert_eq!(body["name"], "maitre");
    Ok(())
}

#[tokio::test]
async fn request_id_is_propagated() -> Result<()> {
    let app = App::new().await?;
    let response = app
        .send(
            Request::get("/health")
                .header("x-request-id", "01HZX3J5D6QK0000000000TEST")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok()),
        Some("01HZX3J5D6QK0000000000TEST")
    );
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() -> Result<()> {
    let app = App::new().await?;
    let wrong = app.login(OWNER_EMAIL, "not-the-password").await?;
    let unknown = app.login("ghost@bistro.fr", OWNER_PASSWORD).await?;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(wrong).await?, json_body(unknown).await?);
    Ok(())
}

#[tokio::test]
async fn login_attempts_are_throttled() -> Result<()> {
    let app = App::with_rate_limiter(Arc::new(WindowRateLimiter::new(2, 2))).await?;
    for _ in 0..2 {
        let response = app.login(OWNER_EMAIL, "not-the-password").await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let limited = app.login(OWNER_EMAIL, OWNER_PASSWORD).await?;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    Ok(())
}

#[tokio::test]
async fn login_without_payload_is_bad_request() -> Result<()> {
    let app = App::new().await?;
    let response = app
        .send(Request::post("/v1/auth/login").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_replay_kills_the_session() -> Result<()> {
    let app = App::new().await?;
    let (_, first) = app.sign_in(OWNER_EMAIL, OWNER_PASSWORD).await?;

    let rotated = app.refresh(&first).await?;
    assert_eq!(rotated.status(), StatusCode::OK);
    let second = refresh_cookie(&rotated).context("rotation sets a new cookie")?;
    assert_ne!(first, second);

    // Presenting the superseded token is a replay.
    let replay = app.refresh(&first).await?;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert!(replay
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .any(|value| value.to_str().is_ok_and(|v| v.contains("Max-Age=0"))));

    // The replay revoked the whole session, so the live token is dead too.
    let after = app.refresh(&second).await?;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn refresh_without_cookie_is_unauthorized() -> Result<()> {
    let app = App::new().await?;
    let response = app
        .send(Request::post("/v1/auth/refresh").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_session() -> Result<()> {
    let app = App::new().await?;
    let (_, cookie) = app.sign_in(OWNER_EMAIL, OWNER_PASSWORD).await?;

    let response = app
        .send(
            Request::post("/v1/auth/logout")
                .header(COOKIE, format!("maitre_refresh={cookie}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(app.refresh(&cookie).await?.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn verify_requires_a_live_bearer_token() -> Result<()> {
    let app = App::new().await?;
    let (access, _) = app.sign_in(OWNER_EMAIL, OWNER_PASSWORD).await?;

    let missing = app
        .send(Request::get("/v1/auth/verify").body(Body::empty())?)
        .await?;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let ok = app
        .send(with_bearer(
            Request::get("/v1/auth/verify").body(Body::empty())?,
            &access,
        )?)
        .await?;
    assert_eq!(ok.status(), StatusCode::OK);
    let body = json_body(ok).await?;
    assert_eq!(body["email"], OWNER_EMAIL);
    assert_eq!(body["role"], "owner");
    assert_eq!(body["tenant_id"], 1);

    app.clock.advance(time::Duration::minutes(16));
    let expired = app
        .send(with_bearer(
            Request::get("/v1/auth/verify").body(Body::empty())?,
            &access,
        )?)
        .await?;
    assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn invitation_flow_and_role_gate() -> Result<()> {
    let mut app = App::new().await?;
    let (owner_access, _) = app.sign_in(OWNER_EMAIL, OWNER_PASSWORD).await?;

    let created = app
        .send(with_bearer(
            post_json(
                "/v1/invitations",
                &json!({ "email": "Chef@Bistro.fr", "role": "chef" }),
            )?,
            &owner_access,
        )?)
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = json_body(created).await?;
    assert_eq!(created["email"], "chef@bistro.fr");
    assert!(created.get("url").is_none());

    let invitation = app.next_email().await?;
    assert_eq!(invitation.to, "chef@bistro.fr");
    let token = token_in(&invitation)?;

    let accepted = app
        .send(post_json(
            "/v1/invitations/accept",
            &json!({ "token": token, "password": "chef-password" }),
        )?)
        .await?;
    assert_eq!(accepted.status(), StatusCode::CREATED);
    assert_eq!(json_body(accepted).await?["role"], "chef");

    let again = app
        .send(post_json(
            "/v1/invitations/accept",
            &json!({ "token": token, "password": "chef-password" }),
        )?)
        .await?;
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);

    // A chef may sign in but may not invite or read the audit trail.
    let (chef_access, _) = app.sign_in("chef@bistro.fr", "chef-password").await?;
    let forbidden = app
        .send(with_bearer(
            post_json(
                "/v1/invitations",
                &json!({ "email": "sous@bistro.fr", "role": "chef" }),
            )?,
            &chef_access,
        )?)
        .await?;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let audit = app
        .send(with_bearer(
            Request::get("/v1/audit").body(Body::empty())?,
            &chef_access,
        )?)
        .await?;
    assert_eq!(audit.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn invitation_rejects_unknown_role() -> Result<()> {
    let app = App::new().await?;
    let (access, _) = app.sign_in(OWNER_EMAIL, OWNER_PASSWORD).await?;
    let response = app
        .send(with_bearer(
            post_json(
                "/v1/invitations",
                &json!({ "email": "sommelier@bistro.fr", "role": "sommelier" }),
            )?,
            &access,
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn password_reset_flow() -> Result<()> {
    let mut app = App::new().await?;
    let (_, cookie) = app.sign_in(OWNER_EMAIL, OWNER_PASSWORD).await?;

    // Unknown accounts get the same answer and no email.
    let unknown = app
        .send(post_json(
            "/v1/password-reset",
            &json!({ "tenant_id": 1, "email": "ghost@bistro.fr" }),
        )?)
        .await?;
    assert_eq!(unknown.status(), StatusCode::ACCEPTED);

    let requested = app
        .send(post_json(
            "/v1/password-reset",
            &json!({ "tenant_id": 1, "email": OWNER_EMAIL }),
        )?)
        .await?;
    assert_eq!(requested.status(), StatusCode::ACCEPTED);

    let message = app.next_email().await?;
    assert_eq!(message.to, OWNER_EMAIL);
    let token = token_in(&message)?;

    let confirmed = app
        .send(post_json(
            "/v1/password-reset/confirm",
            &json!({ "token": token, "password": "brand-new-password" }),
        )?)
        .await?;
    assert_eq!(confirmed.status(), StatusCode::NO_CONTENT);

    // Every existing session is gone and only the new password works.
    assert_eq!(app.refresh(&cookie).await?.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        app.login(OWNER_EMAIL, OWNER_PASSWORD).await?.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.login(OWNER_EMAIL, "brand-new-password").await?.status(),
        StatusCode::OK
    );

    let reused = app
        .send(post_json(
            "/v1/password-reset/confirm",
            &json!({ "token": token, "password": "another-password" }),
        )?)
        .await?;
    assert_eq!(reused.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn sessions_listing_and_revocation() -> Result<()> {
    let app = App::new().await?;
    let (access, current) = app.sign_in(OWNER_EMAIL, OWNER_PASSWORD).await?;
    let (_, other) = app.sign_in(OWNER_EMAIL, OWNER_PASSWORD).await?;

    let listed = app
        .send(with_bearer(
            Request::get("/v1/sessions")
                .header(COOKIE, format!("maitre_refresh={current}"))
                .body(Body::empty())?,
            &access,
        )?)
        .await?;
    assert_eq!(listed.status(), StatusCode::OK);
    let listed = json_body(listed).await?;
    let sessions = listed.as_array().context("session list")?;
    assert_eq!(sessions.len(), 2);
    assert_eq!(
        sessions
            .iter()
            .filter(|session| session["current"] == true)
            .count(),
        1
    );

    let revoked = app
        .send(with_bearer(
            Request::post("/v1/sessions/revoke-others")
                .header(COOKIE, format!("maitre_refresh={current}"))
                .body(Body::empty())?,
            &access,
        )?)
        .await?;
    assert_eq!(revoked.status(), StatusCode::OK);
    assert_eq!(json_body(revoked).await?["revoked_count"], 1);

    assert_eq!(app.refresh(&other).await?.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.refresh(&current).await?.status(), StatusCode::OK);

    let unknown = app
        .send(with_bearer(
            Request::post(format!("/v1/sessions/{}/revoke", uuid::Uuid::now_v7()))
                .body(Body::empty())?,
            &access,
        )?)
        .await?;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn owner_reads_the_audit_trail() -> Result<()> {
    let app = App::new().await?;
    let _ = app.login(OWNER_EMAIL, "not-the-password").await?;
    app.clock.advance(time::Duration::seconds(1));
    let (access, _) = app.sign_in(OWNER_EMAIL, OWNER_PASSWORD).await?;

    let response = app
        .send(with_bearer(
            Request::get("/v1/audit?limit=10").body(Body::empty())?,
            &access,
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let entries = json_body(response).await?;
    let actions: Vec<&str> = entries
        .as_array()
        .context("audit list")?
        .iter()
        .filter_map(|entry| entry["action"].as_str())
        .collect();
    assert_eq!(actions, ["auth.login", "auth.login_failed"]);
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let app = App::new().await?;
    let response = app
        .send(Request::get("/openapi.json").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await?;
    assert!(doc["paths"]["/v1/auth/login"].is_object());
    Ok(())
}
