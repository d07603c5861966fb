use clap::{builder::ValueParser, Arg, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("MAITRE_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_numbers() {
        let command = with_args(Command::new("maitre"));
        for (level, expected) in [("warn", 1u8), ("DEBUG", 3), ("5", 5)] {
            temp_env::with_var("MAITRE_LOG_LEVEL", Some(level), || {
                let matches = command.clone().get_matches_from(vec!["maitre"]);
                assert_eq!(
                    matches.get_one::<u8>(ARG_VERBOSITY).copied(),
                    Some(expected)
                );
            });
        }
    }

    #[test]
    fn rejects_unknown_level() {
        temp_env::with_var("MAITRE_LOG_LEVEL", Some("chatty"), || {
            let result = with_args(Command::new("maitre")).try_get_matches_from(vec!["maitre"]);
            assert!(result.is_err());
        });
    }
}
