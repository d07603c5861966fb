use crate::email::SmtpSettings;
use anyhow::{bail, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SMTP_HOST: &str = "smtp-host";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long("smtp-host")
                .help("SMTP relay host; when unset emails are only logged")
                .env("MAITRE_SMTP_HOST"),
        )
        .arg(
            Arg::new("smtp-port")
                .long("smtp-port")
                .help("SMTP relay port")
                .env("MAITRE_SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("smtp-username")
                .long("smtp-username")
                .help("SMTP username")
                .env("MAITRE_SMTP_USERNAME")
                .requires("smtp-password"),
        )
        .arg(
            Arg::new("smtp-password")
                .long("smtp-password")
                .help("SMTP password")
                .env("MAITRE_SMTP_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("smtp-from")
                .long("smtp-from")
                .help("Sender mailbox, e.g. \"Maitre <no-reply@maitre.dev>\"")
                .env("MAITRE_SMTP_FROM")
                .default_value("Maitre <no-reply@maitre.dev>"),
        )
        .arg(
            Arg::new("smtp-insecure")
                .long("smtp-insecure")
                .help("Talk to the relay without TLS (local relays only)")
                .env("MAITRE_SMTP_INSECURE")
                .action(ArgAction::SetTrue),
        )
}

/// `None` means log-only delivery.
///
/// # Errors
///
/// Returns an error if credentials are given without a host.
pub fn parse(matches: &ArgMatches) -> Result<Option<SmtpSettings>> {
    let Some(host) = matches.get_one::<String>(ARG_SMTP_HOST).cloned() else {
        if matches.contains_id("smtp-username") {
            bail!("--smtp-username requires --smtp-host");
        }
        return Ok(None);
    };

    Ok(Some(SmtpSettings {
        host,
        port: matches.get_one::<u16>("smtp-port").copied().unwrap_or(587),
        username: matches.get_one::<String>("smtp-username").cloned(),
        password: matches
            .get_one::<String>("smtp-password")
            .cloned()
            .map(SecretString::from),
        from: matches
            .get_one::<String>("smtp-from")
            .cloned()
            .unwrap_or_else(|| "Maitre <no-reply@maitre.dev>".to_string()),
        tls: !matches.get_flag("smtp-insecure"),
    }))
}
