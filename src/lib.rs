//! # Emailfirst (email-first two-step signup)
//!
//! Visitors sign up with nothing but an email address. They are logged in
//! right away under a generated placeholder username and receive an
//! activation email. The link in that email lets them choose their real
//! username and password.
//!
//! ## Activation keys
//!
//! A key is `<uid>-<token>`:
//!
//! - **uid:** the numeric user id, AES encrypted with a key derived from the
//!   deployment secret and base32 encoded (`[A-Z2-7]`, `=` written as `0`).
//!   It is not guessable from neighbouring ids.
//! - **token:** an HMAC over the user's password state and last login, so any
//!   password change or login invalidates older keys.
//!
//! Keys are split on the first `-`; the token may contain more of them.
//!
//! ## Configuration
//!
//! The secret must be at least 8 characters. The placeholder username
//! strategy is pluggable, see [`registration::username`].

pub mod api;
pub mod cli;
pub mod registration;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
