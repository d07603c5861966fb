use crate::{
    api,
    auth::{rate_limit::WindowRateLimiter, AuthState, PasswordHashing, SystemClock, TokenIssuer},
    cli::commands::{auth, store},
    email::{LogMailer, Mailer, SmtpMailer, SmtpSettings},
};
use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub store: store::Options,
    pub auth: auth::Options,
    pub smtp: Option<SmtpSettings>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing key is invalid, storage is unreachable, or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    let issuer = TokenIssuer::from_base64_seed(args.auth.signing_key.expose_secret())
        .context("invalid MAITRE_SIGNING_KEY")?;
    info!(kid = issuer.kid(), "Loaded access token signing key");

    let config = args.auth.config(args.store.timeout);
    let hashing = PasswordHashing::new(config.hash_concurrency(), config.hash_timeout());

    let mailer: Arc<dyn Mailer> = match &args.smtp {
        Some(settings) => Arc::new(SmtpMailer::new(settings).context("invalid SMTP settings")?),
        None => {
            warn!("No SMTP host configured; emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let store = super::open_store(&args.store).await?;
    let state = Arc::new(AuthState::new(
        config,
        store,
        issuer,
        hashing,
        mailer,
        Arc::new(WindowRateLimiter::new(
            args.auth.login_per_minute,
            args.auth.reset_per_minute,
        )),
        Arc::new(SystemClock),
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    api::serve(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
