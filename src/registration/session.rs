//! Request context and the login primitive.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::error::StoreError;
use super::store::UserId;

/// Site the visitor registered on; rendered into activation emails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Site {
    pub domain: String,
    pub name: String,
}

impl Site {
    #[must_use]
    pub fn new(domain: String, name: String) -> Self {
        Self { domain, name }
    }
}

impl Default for Site {
    fn default() -> Self {
        Self::new("localhost:8080".to_string(), "emailfirst".to_string())
    }
}

/// Per-request state handed to the backend and to username creators.
///
/// The site is not part of it: the backend renders its configured
/// [`Site`] into every activation email.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub client_ip: Option<String>,
    session: Option<Session>,
}

/// Established login for the current request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_client_ip(mut self, client_ip: Option<String>) -> Self {
        self.client_ip = client_ip;
        self
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub(crate) fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }
}

/// Session registry keyed by opaque tokens.
pub trait SessionStore: Send + Sync {
    /// # Errors
    /// Backend failures only.
    fn login(&self, user_id: UserId) -> Result<String, StoreError>;

    /// # Errors
    /// Backend failures only.
    fn user_for(&self, token: &str) -> Result<Option<UserId>, StoreError>;

    /// # Errors
    /// Backend failures only.
    fn logout(&self, token: &str) -> Result<(), StoreError>;
}

/// Process-local sessions for development and tests. Tokens live until
/// they are replaced by a later login on the same request or the process
/// exits; deployments plug a persistent [`SessionStore`] instead.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, UserId>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 32 random bytes, base64url without padding.
fn generate_session_token() -> Result<String, StoreError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| StoreError::Unavailable(format!("failed to generate session token: {err}")))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

impl SessionStore for MemorySessionStore {
    fn login(&self, user_id: UserId) -> Result<String, StoreError> {
        let token = generate_session_token()?;
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), user_id);
        Ok(token)
    }

    fn user_for(&self, token: &str) -> Result<Option<UserId>, StoreError> {
        Ok(self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .copied())
    }

    fn logout(&self, token: &str) -> Result<(), StoreError> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
        Ok(())
    }
}
