use crate::auth::AuthConfig;
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_SIGNING_KEY: &str = "signing-key";

pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_rate_limit_args(command);
    with_hashing_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for invitation and reset links")
                .env("MAITRE_FRONTEND_BASE_URL")
                .default_value("https://app.maitre.dev"),
        )
        .arg(
            Arg::new(ARG_SIGNING_KEY)
                .long("signing-key")
                .help("Base64 Ed25519 seed used to sign access tokens")
                .env("MAITRE_SIGNING_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("access-ttl-seconds")
                .long("access-ttl-seconds")
                .help("Access token TTL in seconds")
                .env("MAITRE_ACCESS_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Refresh session TTL in seconds")
                .env("MAITRE_SESSION_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("invite-ttl-seconds")
                .long("invite-ttl-seconds")
                .help("Invitation link TTL in seconds")
                .env("MAITRE_INVITE_TTL_SECONDS")
                .default_value("259200")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("reset-ttl-seconds")
                .long("reset-ttl-seconds")
                .help("Password reset link TTL in seconds")
                .env("MAITRE_RESET_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

fn with_rate_limit_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("login-attempts-per-minute")
                .long("login-attempts-per-minute")
                .help("Login attempts allowed per address and per email each minute (0 disables)")
                .env("MAITRE_LOGIN_ATTEMPTS_PER_MINUTE")
                .default_value("10")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("reset-requests-per-minute")
                .long("reset-requests-per-minute")
                .help("Password reset requests allowed per address and per email each minute (0 disables)")
                .env("MAITRE_RESET_REQUESTS_PER_MINUTE")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("trust-forwarded-for")
                .long("trust-forwarded-for")
                .help("Use X-Forwarded-For as the client address (only behind a trusted proxy)")
                .env("MAITRE_TRUST_FORWARDED_FOR")
                .action(ArgAction::SetTrue),
        )
}

/// Hashing knobs are shared with `admin create`.
pub fn with_hashing_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("hash-concurrency")
                .long("hash-concurrency")
                .help("Maximum concurrent password hash operations")
                .env("MAITRE_HASH_CONCURRENCY")
                .default_value("4")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("hash-timeout-ms")
                .long("hash-timeout-ms")
                .help("Upper bound for one password hash in milliseconds")
                .env("MAITRE_HASH_TIMEOUT_MS")
                .default_value("10000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("min-password-length")
                .long("min-password-length")
                .help("Minimum accepted password length")
                .env("MAITRE_MIN_PASSWORD_LENGTH")
                .default_value("8")
                .value_parser(clap::value_parser!(usize)),
        )
}

#[derive(Debug, Clone)]
pub struct HashingOptions {
    pub concurrency: usize,
    pub timeout: Duration,
    pub min_password_length: usize,
}

impl HashingOptions {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            concurrency: matches
                .get_one::<usize>("hash-concurrency")
                .copied()
                .unwrap_or(4)
                .max(1),
            timeout: Duration::from_millis(
                matches
                    .get_one::<u64>("hash-timeout-ms")
                    .copied()
                    .unwrap_or(10_000),
            ),
            min_password_length: matches
                .get_one::<usize>("min-password-length")
                .copied()
                .unwrap_or(8),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub signing_key: SecretString,
    pub access_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub invite_ttl_seconds: i64,
    pub reset_ttl_seconds: i64,
    pub login_per_minute: u32,
    pub reset_per_minute: u32,
    pub trust_forwarded_for: bool,
    pub hashing: HashingOptions,
}

impl Options {
    /// Read the auth arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let signing_key = matches
            .get_one::<String>(ARG_SIGNING_KEY)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --signing-key")?;
        let seconds = |name: &str, default: i64| {
            matches.get_one::<i64>(name).copied().unwrap_or(default)
        };

        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>("frontend-base-url")
                .cloned()
                .unwrap_or_else(|| "https://app.maitre.dev".to_string()),
            signing_key,
            access_ttl_seconds: seconds("access-ttl-seconds", 900),
            session_ttl_seconds: seconds("session-ttl-seconds", 2_592_000),
            invite_ttl_seconds: seconds("invite-ttl-seconds", 259_200),
            reset_ttl_seconds: seconds("reset-ttl-seconds", 3600),
            login_per_minute: matches
                .get_one::<u32>("login-attempts-per-minute")
                .copied()
                .unwrap_or(10),
            reset_per_minute: matches
                .get_one::<u32>("reset-requests-per-minute")
                .copied()
                .unwrap_or(5),
            trust_forwarded_for: matches.get_flag("trust-forwarded-for"),
            hashing: HashingOptions::parse(matches),
        })
    }

    #[must_use]
    pub fn config(&self, storage_timeout: Duration) -> AuthConfig {
        AuthConfig::new(self.frontend_base_url.clone())
            .with_access_ttl_seconds(self.access_ttl_seconds)
            .with_session_ttl_seconds(self.session_ttl_seconds)
            .with_invite_ttl_seconds(self.invite_ttl_seconds)
            .with_reset_ttl_seconds(self.reset_ttl_seconds)
            .with_storage_timeout(storage_timeout)
            .with_hash_timeout(self.hashing.timeout)
            .with_hash_concurrency(self.hashing.concurrency)
            .with_min_password_length(self.hashing.min_password_length)
            .with_trust_forwarded_for(self.trust_forwarded_for)
    }
}
