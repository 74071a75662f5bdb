use crate::api;
use crate::cli::commands::registration::Options;
use crate::registration::{
    Collaborators, EmailOnlyBackend, LogEmailSender, RegistrationEvents, RegistrationSettings,
    Site, UsernameCreatorSetting, signals::LogRegistrationListener,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub registration: Options,
}

fn settings(options: Options) -> RegistrationSettings {
    let mut settings = RegistrationSettings::new(options.secret_key)
        .with_registration_open(options.registration_open)
        .with_activation_timeout_days(options.activation_timeout_days)
        .with_default_from_email(options.from_email)
        .with_frontend_base_url(options.frontend_base_url)
        .with_site(Site::new(options.site_domain, options.site_name));
    if let Some(path) = options.username_creator {
        settings = settings.with_username_creator(UsernameCreatorSetting::Path(path));
    }
    settings
}

/// Build the backend with in-memory stores and log-only email delivery.
///
/// # Errors
/// Returns an error for invalid registration configuration.
pub fn backend(options: Options) -> Result<EmailOnlyBackend> {
    let collaborators = Collaborators::in_memory(Arc::new(LogEmailSender)).with_events(
        RegistrationEvents::new().with_listener(Arc::new(LogRegistrationListener)),
    );
    EmailOnlyBackend::new(settings(options), collaborators)
        .context("Invalid registration configuration")
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let backend = backend(args.registration)?;

    debug!("Registration backend: {:?}", backend);

    api::new(args.port, Arc::new(backend)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn options(secret: &str) -> Options {
        Options {
            secret_key: SecretString::from(secret.to_string()),
            frontend_base_url: "https://emailfirst.dev".to_string(),
            site_domain: "emailfirst.dev".to_string(),
            site_name: "Emailfirst".to_string(),
            from_email: "noreply@emailfirst.dev".to_string(),
            username_creator: None,
            registration_open: false,
            activation_timeout_days: 5,
        }
    }

    #[test]
    fn settings_carry_options() {
        let mut opts = options("shhh secret");
        opts.username_creator = Some("emailfirst::username::email_local_part".to_string());
        let settings = settings(opts);
        assert!(!settings.registration_open());
        assert_eq!(settings.activation_timeout_days(), 5);
        assert_eq!(settings.default_from_email(), "noreply@emailfirst.dev");
        assert_eq!(settings.site().name, "Emailfirst");
        assert!(matches!(
            settings.username_creator(),
            Some(UsernameCreatorSetting::Path(path)) if path == "emailfirst::username::email_local_part"
        ));
    }

    #[test]
    fn backend_builds_from_valid_options() -> Result<()> {
        let backend = backend(options("shhh secret"))?;
        assert!(!backend.registration_allowed());
        Ok(())
    }

    #[test]
    fn backend_rejects_short_secret() {
        assert!(backend(options("short")).is_err());
    }

    #[test]
    fn backend_rejects_unknown_username_creator() {
        let mut opts = options("shhh secret");
        opts.username_creator = Some("nowhere::creator".to_string());
        let result = backend(opts);
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(format!("{err:#}").contains("nowhere::creator"));
        }
    }
}
