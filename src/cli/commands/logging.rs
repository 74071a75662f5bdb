use clap::{Arg, ArgMatches, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_LEVEL: &str = "log-level";
pub const ARG_LOG_FORMAT: &str = "log-format";

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
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .global(true)
                .action(clap::ArgAction::Count),
        )
        .arg(
            Arg::new(ARG_LOG_LEVEL)
                .long("log-level")
                .help("Log level by name or number: error, warn, info, debug, trace")
                .env("EMAILFIRST_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Set)
                .value_parser(validator_log_level()),
        )
        .arg(
            Arg::new(ARG_LOG_FORMAT)
                .long("log-format")
                .help("Log output format")
                .env("EMAILFIRST_LOG_FORMAT")
                .default_value("pretty")
                .value_parser(["pretty", "json"]),
        )
}

/// The louder of `-v` repetitions and `--log-level`.
#[must_use]
pub fn verbosity(matches: &ArgMatches) -> u8 {
    let count = matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or(0);
    let level = matches.get_one::<u8>(ARG_LOG_LEVEL).copied().unwrap_or(0);
    count.max(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_names_and_numbers() {
        let command = with_args(Command::new("test"));
        for (index, level) in ["error", "warn", "info", "debug", "trace"].iter().enumerate() {
            temp_env::with_vars([("EMAILFIRST_LOG_LEVEL", Some(*level))], || {
                let matches = command.clone().get_matches_from(vec!["test"]);
                assert_eq!(
                    matches.get_one::<u8>(ARG_LOG_LEVEL).copied(),
                    u8::try_from(index).ok()
                );
                assert_eq!(Some(verbosity(&matches)), u8::try_from(index).ok());
            });
        }
    }

    #[test]
    fn verbose_flags_and_log_level_take_the_louder() {
        temp_env::with_vars([("EMAILFIRST_LOG_LEVEL", Some("warn"))], || {
            let matches = with_args(Command::new("test")).get_matches_from(vec!["test", "-vvv"]);
            assert_eq!(verbosity(&matches), 3);

            let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
            assert_eq!(verbosity(&matches), 1);
        });
        temp_env::with_vars([("EMAILFIRST_LOG_LEVEL", None::<&str>)], || {
            let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
            assert_eq!(verbosity(&matches), 0);
        });
    }

    #[test]
    fn log_level_rejects_unknown_names() {
        temp_env::with_vars([("EMAILFIRST_LOG_LEVEL", None::<&str>)], || {
            let result = with_args(Command::new("test")).try_get_matches_from(vec![
                "test",
                "--log-level",
                "loud",
            ]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn log_format_defaults_to_pretty() {
        temp_env::with_vars([("EMAILFIRST_LOG_FORMAT", None::<&str>)], || {
            let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
            assert_eq!(
                matches.get_one::<String>(ARG_LOG_FORMAT).map(String::as_str),
                Some("pretty")
            );
        });
    }

    #[test]
    fn log_format_rejects_unknown_values() {
        let result = with_args(Command::new("test")).try_get_matches_from(vec![
            "test",
            "--log-format",
            "xml",
        ]);
        assert!(result.is_err());
    }
}
