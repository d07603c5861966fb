//! Map parsed arguments to the action the binary runs.

use crate::cli::{
    actions::{admin, server, sessions, Action},
    commands::{self, auth, email, store},
};
use crate::store::Role;
use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use secrecy::SecretString;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((commands::CMD_SERVE, sub)) => serve(sub),
        Some((commands::CMD_ADMIN, sub)) => match sub.subcommand() {
            Some((commands::CMD_ADMIN_CREATE, create)) => create_admin(create),
            _ => bail!("missing admin subcommand"),
        },
        Some((commands::CMD_SESSIONS, sub)) => match sub.subcommand() {
            Some((commands::CMD_SESSIONS_PURGE, purge)) => purge_sessions(purge),
            _ => bail!("missing sessions subcommand"),
        },
        _ => bail!("missing subcommand"),
    }
}

fn serve(matches: &ArgMatches) -> Result<Action> {
    Ok(Action::Server(server::Args {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        store: store::Options::parse(matches)?,
        auth: auth::Options::parse(matches)?,
        smtp: email::parse(matches)?,
    }))
}

fn create_admin(matches: &ArgMatches) -> Result<Action> {
    let role = matches
        .get_one::<String>("role")
        .map_or(Ok(Role::Owner), |role| role.parse::<Role>())
        .map_err(|err| anyhow!(err))?;

    Ok(Action::CreateAdmin(admin::Args {
        tenant_id: matches
            .get_one::<i64>("tenant")
            .copied()
            .context("missing required argument: --tenant")?,
        email: matches
            .get_one::<String>("email")
            .cloned()
            .context("missing required argument: --email")?,
        password: matches
            .get_one::<String>("password")
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --password")?,
        role,
        store: store::Options::parse(matches)?,
        hashing: auth::HashingOptions::parse(matches),
    }))
}

fn purge_sessions(matches: &ArgMatches) -> Result<Action> {
    Ok(Action::PurgeSessions(sessions::Args {
        retention_days: matches
            .get_one::<i64>("retention-days")
            .copied()
            .unwrap_or(30),
        store: store::Options::parse(matches)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::store::Backend;

    #[test]
    fn serve_requires_a_backend() {
        temp_env::with_vars(
            [
                ("MAITRE_DSN", None::<&str>),
                ("MAITRE_IN_MEMORY", None),
                ("MAITRE_SIGNING_KEY", Some("c2VlZA")),
            ],
            || {
                let matches = commands::new().get_matches_from(vec!["maitre", "serve"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err.to_string().contains("missing required argument: --dsn"));
                }
            },
        );
    }

    #[test]
    fn serve_in_memory() {
        temp_env::with_vars(
            [
                ("MAITRE_SIGNING_KEY", Some("c2VlZA")),
                ("MAITRE_SMTP_HOST", None),
                ("MAITRE_PORT", None),
            ],
            || {
                let matches =
                    commands::new().get_matches_from(vec!["maitre", "serve", "--in-memory"]);
                let action = handler(&matches);
                assert!(matches!(
                    action,
                    Ok(Action::Server(server::Args {
                        port: 8080,
                        store: store::Options {
                            backend: Backend::Memory,
                            ..
                        },
                        smtp: None,
                        ..
                    }))
                ));
            },
        );
    }

    #[test]
    fn admin_create() {
        temp_env::with_vars(
            [
                ("MAITRE_ADMIN_PASSWORD", Some("owner-password")),
                ("MAITRE_DSN", None::<&str>),
            ],
            || {
                let matches = commands::new().get_matches_from(vec![
                    "maitre",
                    "admin",
                    "create",
                    "--in-memory",
                    "--tenant",
                    "7",
                    "--email",
                    "chef@bistro.fr",
                    "--role",
                    "chef",
                ]);
                let action = handler(&matches);
                assert!(matches!(
                    action,
                    Ok(Action::CreateAdmin(admin::Args {
                        tenant_id: 7,
                        role: Role::Chef,
                        ..
                    }))
                ));
                if let Ok(action) = action {
                    assert!(!format!("{action:?}").contains("owner-password"));
                }
            },
        );
    }

    #[test]
    fn sessions_purge() {
        temp_env::with_var_unset("MAITRE_DSN", || {
            let matches = commands::new().get_matches_from(vec![
                "maitre",
                "sessions",
                "purge",
                "--dsn",
                "postgres://maitre@localhost/maitre",
                "--retention-days",
                "7",
            ]);
            assert!(matches!(
                handler(&matches),
                Ok(Action::PurgeSessions(sessions::Args {
                    retention_days: 7,
                    ..
                }))
            ));
        });
    }
}
