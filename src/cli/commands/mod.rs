pub mod auth;
pub mod email;
pub mod logging;
pub mod store;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const CMD_SERVE: &str = "serve";
pub const CMD_ADMIN: &str = "admin";
pub const CMD_ADMIN_CREATE: &str = "create";
pub const CMD_SESSIONS: &str = "sessions";
pub const CMD_SESSIONS_PURGE: &str = "purge";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("maitre")
        .about("Back-office authentication and session lifecycle")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(serve())
        .subcommand(admin())
        .subcommand(sessions());

    logging::with_args(command)
}

fn serve() -> Command {
    let command = Command::new(CMD_SERVE).about("Run the HTTP API").arg(
        Arg::new("port")
            .short('p')
            .long("port")
            .help("Port to listen on")
            .default_value("8080")
            .env("MAITRE_PORT")
            .value_parser(clap::value_parser!(u16)),
    );
    let command = store::with_args(command);
    let command = auth::with_args(command);
    email::with_args(command)
}

fn admin() -> Command {
    let create = Command::new(CMD_ADMIN_CREATE)
        .about("Create an administrator, or reset an existing one's password and role")
        .arg(
            Arg::new("tenant")
                .long("tenant")
                .help("Tenant id")
                .env("MAITRE_ADMIN_TENANT")
                .required(true)
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("email")
                .long("email")
                .help("Administrator email")
                .env("MAITRE_ADMIN_EMAIL")
                .required(true),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .help("Administrator password")
                .env("MAITRE_ADMIN_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("role")
                .long("role")
                .help("Administrator role")
                .env("MAITRE_ADMIN_ROLE")
                .default_value("owner")
                .value_parser(["owner", "chef"]),
        );
    let create = store::with_args(create);
    let create = auth::with_hashing_args(create);

    Command::new(CMD_ADMIN)
        .about("Manage administrators")
        .subcommand_required(true)
        .subcommand(create)
}

fn sessions() -> Command {
    let purge = Command::new(CMD_SESSIONS_PURGE)
        .about("Delete sessions revoked or expired before the retention window")
        .arg(
            Arg::new("retention-days")
                .long("retention-days")
                .help("Keep dead sessions for this many days")
                .env("MAITRE_SESSION_RETENTION_DAYS")
                .default_value("30")
                .value_parser(clap::value_parser!(i64).range(0..)),
        );
    let purge = store::with_args(purge);

    Command::new(CMD_SESSIONS)
        .about("Maintain refresh sessions")
        .subcommand_required(true)
        .subcommand(purge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "maitre");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Back-office authentication and session lifecycle".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
        command.debug_assert();
    }

    #[test]
    fn test_serve_env() {
        temp_env::with_vars(
            [
                ("MAITRE_PORT", Some("443")),
                ("MAITRE_DSN", Some("postgres://maitre@localhost:5432/maitre")),
                ("MAITRE_SIGNING_KEY", Some("c2VlZA")),
                ("MAITRE_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["maitre", "serve"]);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
                let serve = matches.subcommand_matches(CMD_SERVE);
                assert_eq!(
                    serve.and_then(|m| m.get_one::<u16>("port").copied()),
                    Some(443)
                );
                assert_eq!(
                    serve.and_then(|m| m.get_one::<String>(store::ARG_DSN).cloned()),
                    Some("postgres://maitre@localhost:5432/maitre".to_string())
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("MAITRE_LOG_LEVEL", None::<String>)], || {
                let mut args = vec![
                    "maitre".to_string(),
                    "serve".to_string(),
                    "--in-memory".to_string(),
                    "--signing-key".to_string(),
                    "c2VlZA".to_string(),
                ];

                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_subcommand_required() {
        let result = new().try_get_matches_from(vec!["maitre"]);
        assert!(result.is_err());
        let result = new().try_get_matches_from(vec!["maitre", "admin"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_admin_create_rejects_unknown_role() {
        let result = new().try_get_matches_from(vec![
            "maitre",
            "admin",
            "create",
            "--in-memory",
            "--tenant",
            "1",
            "--email",
            "owner@bistro.fr",
            "--password",
            "owner-password",
            "--role",
            "sommelier",
        ]);
        assert_eq!(
            result.map_err(|e| e.kind()).err(),
            Some(clap::error::ErrorKind::InvalidValue)
        );
    }

    #[test]
    fn test_sessions_purge_defaults() {
        temp_env::with_var_unset("MAITRE_SESSION_RETENTION_DAYS", || {
            let matches = new().get_matches_from(vec!["maitre", "sessions", "purge", "--in-memory"]);
            let retention = matches
                .subcommand_matches(CMD_SESSIONS)
                .and_then(|m| m.subcommand_matches(CMD_SESSIONS_PURGE))
                .and_then(|m| m.get_one::<i64>("retention-days").copied());
            assert_eq!(retention, Some(30));
        });
    }
}
