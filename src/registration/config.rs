//! Registration settings and the process-wide secret.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use url::Url;

use super::error::ConfigError;
use super::session::Site;
use super::username::UsernameCreatorSetting;

pub const MIN_SECRET_KEY_LEN: usize = 8;
const DEFAULT_ACTIVATION_TIMEOUT_DAYS: u32 = 3;
const DEFAULT_FROM_EMAIL: &str = "webmaster@localhost";
const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:8080";

/// Validated deployment secret; every key used by the crate is derived from it.
#[derive(Clone)]
pub struct SecretKey(SecretString);

impl SecretKey {
    /// # Errors
    /// Returns `ConfigError::SecretTooShort` when the secret has fewer than
    /// [`MIN_SECRET_KEY_LEN`] characters.
    pub fn new(secret: SecretString) -> Result<Self, ConfigError> {
        if secret.expose_secret().chars().count() < MIN_SECRET_KEY_LEN {
            return Err(ConfigError::SecretTooShort {
                min: MIN_SECRET_KEY_LEN,
            });
        }
        Ok(Self(secret))
    }

    /// Derive a 32-byte subkey bound to `purpose`.
    #[must_use]
    pub fn derive(&self, purpose: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(purpose.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.0.expose_secret().as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&hasher.finalize());
        key
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretKey").field(&"***").finish()
    }
}

#[derive(Clone, Debug)]
pub struct RegistrationSettings {
    secret_key: SecretString,
    registration_open: bool,
    username_creator: Option<UsernameCreatorSetting>,
    activation_timeout_days: u32,
    default_from_email: String,
    frontend_base_url: String,
    site: Site,
}

impl RegistrationSettings {
    #[must_use]
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            secret_key,
            registration_open: true,
            username_creator: None,
            activation_timeout_days: DEFAULT_ACTIVATION_TIMEOUT_DAYS,
            default_from_email: DEFAULT_FROM_EMAIL.to_string(),
            frontend_base_url: DEFAULT_FRONTEND_BASE_URL.to_string(),
            site: Site::default(),
        }
    }

    #[must_use]
    pub fn with_registration_open(mut self, open: bool) -> Self {
        self.registration_open = open;
        self
    }

    #[must_use]
    pub fn with_username_creator(mut self, setting: UsernameCreatorSetting) -> Self {
        self.username_creator = Some(setting);
        self
    }

    #[must_use]
    pub fn with_activation_timeout_days(mut self, days: u32) -> Self {
        self.activation_timeout_days = days;
        self
    }

    #[must_use]
    pub fn with_default_from_email(mut self, email: String) -> Self {
        self.default_from_email = email;
        self
    }

    #[must_use]
    pub fn with_frontend_base_url(mut self, url: String) -> Self {
        self.frontend_base_url = url;
        self
    }

    #[must_use]
    pub fn with_site(mut self, site: Site) -> Self {
        self.site = site;
        self
    }

    /// Validate the secret; called once at startup.
    ///
    /// # Errors
    /// Returns `ConfigError::SecretTooShort` for short secrets.
    pub fn secret_key(&self) -> Result<SecretKey, ConfigError> {
        SecretKey::new(self.secret_key.clone())
    }

    /// # Errors
    /// Returns `ConfigError::FrontendUrl` when the base URL does not parse or
    /// has no host.
    pub fn validate_frontend_base_url(&self) -> Result<(), ConfigError> {
        let parsed = Url::parse(&self.frontend_base_url)
            .map_err(|err| ConfigError::FrontendUrl(format!("{}: {err}", self.frontend_base_url)))?;
        if parsed.host_str().is_none() {
            return Err(ConfigError::FrontendUrl(self.frontend_base_url.clone()));
        }
        Ok(())
    }

    #[must_use]
    pub fn registration_open(&self) -> bool {
        self.registration_open
    }

    #[must_use]
    pub fn username_creator(&self) -> Option<&UsernameCreatorSetting> {
        self.username_creator.as_ref()
    }

    #[must_use]
    pub fn activation_timeout_days(&self) -> u32 {
        self.activation_timeout_days
    }

    #[must_use]
    pub fn default_from_email(&self) -> &str {
        &self.default_from_email
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn site(&self) -> &Site {
        &self.site
    }
}
