//! Two-step signup.
//!
//! 1. [`EmailOnlyBackend::register`] takes only an email. It creates a user
//!    with a generated placeholder username, logs them in, makes the password
//!    unusable and mails an activation key `<uid>-<token>`.
//! 2. [`EmailOnlyBackend::activate`] takes that key plus the username and
//!    password the visitor picked. The token is bound to the password state
//!    and last login, so a key stops working once it has been used.
//!
//! The uid is the user id encrypted with a key derived from the deployment
//! secret, see [`UidCodec`].

pub mod activation;
pub mod backend;
pub mod config;
pub mod email;
pub mod error;
pub mod forms;
pub mod session;
pub mod signals;
pub mod store;
pub mod token;
pub mod uid;
pub mod username;

pub use activation::{ACTIVATION_KEY_SEPARATOR, ActivationKeys};
pub use backend::{Collaborators, EmailOnlyBackend};
pub use config::{RegistrationSettings, SecretKey};
pub use email::{EmailMessage, EmailSender, LogEmailSender, MemoryOutbox, TemplateRenderer};
pub use error::{ConfigError, DecodeError, Error, StoreError, ValidationError};
pub use forms::{ActivationForm, RegistrationForm};
pub use session::{MemorySessionStore, RequestContext, SessionStore, Site};
pub use signals::{RegistrationEvents, RegistrationListener, UserRegistered};
pub use store::{MemoryUserStore, UserId, UserRecord, UserStore};
pub use token::{HmacTokenGenerator, TokenGenerator};
pub use uid::UidCodec;
pub use username::{
    CreatorRegistry, UsernameCreator, UsernameCreatorSetting, get_username_creator,
};
