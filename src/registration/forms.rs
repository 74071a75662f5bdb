//! Input validation for the two signup steps.

use regex::Regex;
use serde::Deserialize;
use utoipa::ToSchema;

use super::error::ValidationError;
use super::store::UserStore;
use super::username::USERNAME_MAX_LEN;

pub const EMAIL_MAX_LEN: usize = 75;

/// Basic email format check on already-trimmed input.
pub(crate) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

fn valid_username(username: &str) -> bool {
    Regex::new(r"^\w+$").is_ok_and(|regex| regex.is_match(username))
}

/// First step: email only.
#[derive(ToSchema, Deserialize, Debug, Clone)]
pub struct RegistrationForm {
    pub email: String,
}

impl RegistrationForm {
    /// Return the cleaned email.
    ///
    /// # Errors
    /// The first failing rule: required, length, format, then uniqueness
    /// (case-insensitive).
    pub fn clean(&self, users: &dyn UserStore) -> Result<String, ValidationError> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(ValidationError::Required("email"));
        }
        if email.chars().count() > EMAIL_MAX_LEN {
            return Err(ValidationError::TooLong {
                field: "email",
                max: EMAIL_MAX_LEN,
            });
        }
        if !valid_email(email) {
            return Err(ValidationError::InvalidEmail);
        }
        if users.email_exists_ignore_case(email)? {
            return Err(ValidationError::EmailInUse);
        }
        Ok(email.to_string())
    }
}

/// Second step: pick the real username and password.
#[derive(ToSchema, Deserialize, Clone)]
pub struct ActivationForm {
    pub username: String,
    pub password: String,
}

/// Cleaned activation input.
#[derive(Clone, PartialEq, Eq)]
pub struct ActivationInput {
    pub username: String,
    pub password: String,
}

impl ActivationForm {
    /// # Errors
    /// The first failing rule on username (required, length, `^\w+$`,
    /// case-insensitive uniqueness), then on password (required).
    pub fn clean(&self, users: &dyn UserStore) -> Result<ActivationInput, ValidationError> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(ValidationError::Required("username"));
        }
        if username.chars().count() > USERNAME_MAX_LEN {
            return Err(ValidationError::TooLong {
                field: "username",
                max: USERNAME_MAX_LEN,
            });
        }
        if !valid_username(username) {
            return Err(ValidationError::InvalidUsername);
        }
        if users.username_exists_ignore_case(username)? {
            return Err(ValidationError::UsernameInUse);
        }
        if self.password.is_empty() {
            return Err(ValidationError::Required("password"));
        }
        Ok(ActivationInput {
            username: username.to_string(),
            password: self.password.clone(),
        })
    }
}

impl std::fmt::Debug for ActivationForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationForm")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl std::fmt::Debug for ActivationInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationInput")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
