use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("secret-key")
                .long("secret-key")
                .help("Secret used to derive the uid cipher and token keys (at least 8 characters)")
                .env("EMAILFIRST_SECRET_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for activation links")
                .env("EMAILFIRST_FRONTEND_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new("site-domain")
                .long("site-domain")
                .help("Site domain shown in activation emails")
                .env("EMAILFIRST_SITE_DOMAIN")
                .default_value("localhost:8080"),
        )
        .arg(
            Arg::new("site-name")
                .long("site-name")
                .help("Site name shown in activation emails")
                .env("EMAILFIRST_SITE_NAME")
                .default_value("emailfirst"),
        )
        .arg(
            Arg::new("from-email")
                .long("from-email")
                .help("Sender address for activation emails")
                .env("EMAILFIRST_FROM_EMAIL")
                .default_value("webmaster@localhost"),
        )
        .arg(
            Arg::new("username-creator")
                .long("username-creator")
                .help("Registered name of the placeholder username creator")
                .env("EMAILFIRST_USERNAME_CREATOR"),
        )
        .arg(
            Arg::new("registration-closed")
                .long("registration-closed")
                .help("Refuse new registrations")
                .env("EMAILFIRST_REGISTRATION_CLOSED")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("activation-timeout-days")
                .long("activation-timeout-days")
                .help("Days an activation key stays valid")
                .env("EMAILFIRST_ACTIVATION_TIMEOUT_DAYS")
                .default_value("3")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub secret_key: SecretString,
    pub frontend_base_url: String,
    pub site_domain: String,
    pub site_name: String,
    pub from_email: String,
    pub username_creator: Option<String>,
    pub registration_open: bool,
    pub activation_timeout_days: u32,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let string = |name: &str| -> Result<String> {
            matches
                .get_one::<String>(name)
                .cloned()
                .with_context(|| format!("missing required argument: --{name}"))
        };

        Ok(Self {
            secret_key: SecretString::from(string("secret-key")?),
            frontend_base_url: string("frontend-base-url")?,
            site_domain: string("site-domain")?,
            site_name: string("site-name")?,
            from_email: string("from-email")?,
            username_creator: matches.get_one::<String>("username-creator").cloned(),
            registration_open: !matches.get_flag("registration-closed"),
            activation_timeout_days: matches
                .get_one::<u32>("activation-timeout-days")
                .copied()
                .unwrap_or(3),
        })
    }
}
