use thiserror::Error;

use super::store::UserId;

/// Failures surfaced by the registration backend.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("registration is closed")]
    RegistrationClosed,
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("password hashing failed")]
    PasswordHash,
    #[error("freshly created user {0} could not be authenticated")]
    Authentication(String),
    #[error("could not pick a free username after {0} attempts")]
    UsernameExhausted(usize),
    #[error("activation email failed: {0}")]
    Email(String),
}

/// Deployment configuration problems; fatal, surfaced to the operator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("secret key must be at least {min} characters long")]
    SecretTooShort { min: usize },
    #[error("invalid key material: {0}")]
    KeyMaterial(String),
    #[error(
        "username creator setting is invalid: the value you provided ({0}) cannot be resolved"
    )]
    UnresolvableUsernameCreator(String),
    #[error(
        "username creator setting is invalid: expected a creator or the registered name of one, got {0}"
    )]
    InvalidUsernameCreator(String),
    #[error("invalid frontend base URL: {0}")]
    FrontendUrl(String),
}

/// Reasons a uid cannot be turned back into a user id.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum DecodeError {
    #[error("invalid uid length")]
    InvalidLength,
    #[error("invalid uid alphabet")]
    InvalidAlphabet,
    #[error("invalid base32 encoding")]
    InvalidEncoding,
    #[error("invalid uid payload")]
    InvalidPayload,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("username already taken: {0}")]
    UsernameTaken(String),
    #[error("user not found: {0}")]
    NotFound(UserId),
    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

/// Form-level validation failures; messages are shown to the visitor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("This field is required.")]
    Required(&'static str),
    #[error("Ensure this value has at most {max} characters.")]
    TooLong { field: &'static str, max: usize },
    #[error("Enter a valid e-mail address.")]
    InvalidEmail,
    #[error("This email address is already in use. Please supply a different email address.")]
    EmailInUse,
    #[error("This value must contain only letters, numbers and underscores.")]
    InvalidUsername,
    #[error("A user with that username already exists.")]
    UsernameInUse,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ValidationError {
    /// Name of the form field the error belongs to.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::Required(field) | Self::TooLong { field, .. } => field,
            Self::InvalidEmail | Self::EmailInUse => "email",
            Self::InvalidUsername | Self::UsernameInUse => "username",
            Self::Store(_) => "__all__",
        }
    }
}
