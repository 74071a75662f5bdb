//! Placeholder usernames for first-step registration.
//!
//! Deployments pick the strategy with [`UsernameCreatorSetting`]: unset uses
//! [`DefaultUsernameCreator`], a name is looked up in a [`CreatorRegistry`],
//! and a creator value is used as-is.

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use super::error::{ConfigError, StoreError};
use super::session::RequestContext;
use super::store::UserStore;

pub const DEFAULT_CREATOR: &str = "emailfirst::username::default";
pub const EMAIL_LOCAL_PART_CREATOR: &str = "emailfirst::username::email_local_part";

/// Maximum username length accepted at activation; generated names fit it.
pub const USERNAME_MAX_LEN: usize = 30;

/// Derives a username from the request and the email being registered.
pub trait UsernameCreator: Send + Sync {
    /// # Errors
    /// Backend failures from the user store.
    fn create_username(
        &self,
        request: &RequestContext,
        email: &str,
        users: &dyn UserStore,
    ) -> Result<String, StoreError>;
}

impl<F> UsernameCreator for F
where
    F: Fn(&RequestContext, &str, &dyn UserStore) -> Result<String, StoreError> + Send + Sync,
{
    fn create_username(
        &self,
        request: &RequestContext,
        email: &str,
        users: &dyn UserStore,
    ) -> Result<String, StoreError> {
        self(request, email, users)
    }
}

/// Random 30 character hex name, retried until the store has no such user.
///
/// The check and the later insert are not atomic; the store's own
/// uniqueness check rejects the loser of a race.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultUsernameCreator;

fn random_username() -> String {
    let mut username = Uuid::new_v4().simple().to_string();
    username.truncate(USERNAME_MAX_LEN);
    username
}

impl UsernameCreator for DefaultUsernameCreator {
    fn create_username(
        &self,
        _request: &RequestContext,
        _email: &str,
        users: &dyn UserStore,
    ) -> Result<String, StoreError> {
        let mut username = random_username();
        while users.get_by_username(&username)?.is_some() {
            username = random_username();
        }
        Ok(username)
    }
}

/// Uses the sanitized local part of the email, suffixed with a counter on
/// collision (`jane`, `jane2`, `jane3`, ...).
#[derive(Clone, Copy, Debug, Default)]
pub struct EmailLocalPartCreator;

impl UsernameCreator for EmailLocalPartCreator {
    fn create_username(
        &self,
        _request: &RequestContext,
        email: &str,
        users: &dyn UserStore,
    ) -> Result<String, StoreError> {
        let local = email.split('@').next().unwrap_or_default();
        let mut base: String = word_chars(local).chars().take(USERNAME_MAX_LEN).collect();
        if base.is_empty() {
            base = "user".to_string();
        }

        let mut candidate = base.clone();
        let mut counter: u64 = 1;
        while users.get_by_username(&candidate)?.is_some() {
            counter += 1;
            let suffix = counter.to_string();
            let keep = USERNAME_MAX_LEN.saturating_sub(suffix.len());
            candidate = base.chars().take(keep).collect::<String>() + &suffix;
        }
        Ok(candidate)
    }
}

/// Keeps only the characters activation accepts in a username (`\w`).
fn word_chars(text: &str) -> String {
    Regex::new(r"\W").map_or_else(
        |_| String::new(),
        |regex| regex.replace_all(text, "").into_owned(),
    )
}

/// Configured username strategy.
#[derive(Clone, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum UsernameCreatorSetting {
    /// Name of a creator registered in the [`CreatorRegistry`].
    Path(String),
    /// A creator supplied directly by the embedding application.
    Creator(Arc<dyn UsernameCreator>),
    /// Any other configured value; carries the kind of value found.
    Unsupported(String),
}

impl From<serde_json::Value> for UsernameCreatorSetting {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::String(path) => Self::Path(path),
            Value::Null => Self::Unsupported("null".to_string()),
            Value::Bool(_) => Self::Unsupported("boolean".to_string()),
            Value::Number(_) => Self::Unsupported("number".to_string()),
            Value::Array(_) => Self::Unsupported("array".to_string()),
            Value::Object(_) => Self::Unsupported("object".to_string()),
        }
    }
}

impl std::fmt::Debug for UsernameCreatorSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Creator(_) => f.write_str("Creator(..)"),
            Self::Unsupported(kind) => f.debug_tuple("Unsupported").field(kind).finish(),
        }
    }
}

/// Named creators that configuration strings can refer to.
#[derive(Clone)]
pub struct CreatorRegistry {
    creators: BTreeMap<String, Arc<dyn UsernameCreator>>,
}

impl CreatorRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            creators: BTreeMap::new(),
        }
    }

    /// Registry holding the built-in creators.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_CREATOR, Arc::new(DefaultUsernameCreator));
        registry.register(EMAIL_LOCAL_PART_CREATOR, Arc::new(EmailLocalPartCreator));
        registry
    }

    pub fn register(&mut self, path: &str, creator: Arc<dyn UsernameCreator>) {
        self.creators.insert(path.to_string(), creator);
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<Arc<dyn UsernameCreator>> {
        self.creators.get(path).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.creators.keys().map(String::as_str)
    }
}

impl Default for CreatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for CreatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.creators.keys()).finish()
    }
}

/// Pick the username creator for this call.
///
/// # Errors
/// `ConfigError::UnresolvableUsernameCreator` for unknown names and
/// `ConfigError::InvalidUsernameCreator` for unsupported values.
pub fn get_username_creator(
    setting: Option<&UsernameCreatorSetting>,
    registry: &CreatorRegistry,
) -> Result<Arc<dyn UsernameCreator>, ConfigError> {
    match setting {
        None => Ok(Arc::new(DefaultUsernameCreator)),
        Some(UsernameCreatorSetting::Path(path)) => registry
            .get(path)
            .ok_or_else(|| ConfigError::UnresolvableUsernameCreator(path.clone())),
        Some(UsernameCreatorSetting::Creator(creator)) => Ok(creator.clone()),
        Some(UsernameCreatorSetting::Unsupported(kind)) => {
            Err(ConfigError::InvalidUsernameCreator(kind.clone()))
        }
    }
}
