use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

pub const ARG_DSN: &str = "dsn";
pub const ARG_IN_MEMORY: &str = "in-memory";
pub const ARG_STORAGE_TIMEOUT_MS: &str = "storage-timeout-ms";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("MAITRE_DSN")
                .conflicts_with(ARG_IN_MEMORY),
        )
        .arg(
            Arg::new(ARG_IN_MEMORY)
                .long("in-memory")
                .help("Keep everything in process memory (development only)")
                .env("MAITRE_IN_MEMORY")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_STORAGE_TIMEOUT_MS)
                .long("storage-timeout-ms")
                .help("Upper bound for a single storage call in milliseconds")
                .env("MAITRE_STORAGE_TIMEOUT_MS")
                .default_value("5000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Postgres(String),
    Memory,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub backend: Backend,
    pub timeout: Duration,
}

impl Options {
    /// Read the storage arguments.
    ///
    /// # Errors
    ///
    /// Returns an error when neither `--dsn` nor `--in-memory` was given.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let backend = if matches.get_flag(ARG_IN_MEMORY) {
            Backend::Memory
        } else {
            let dsn = matches
                .get_one::<String>(ARG_DSN)
                .cloned()
                .context("missing required argument: --dsn (or --in-memory)")?;
            if dsn.trim().is_empty() {
                bail!("--dsn must not be empty");
            }
            Backend::Postgres(dsn)
        };
        let timeout = matches
            .get_one::<u64>(ARG_STORAGE_TIMEOUT_MS)
            .copied()
            .map_or(Duration::from_secs(5), Duration::from_millis);
        Ok(Self { backend, timeout })
    }
}
