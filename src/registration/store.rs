//! User records, passwords, and the user store seam.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use super::error::{Error, StoreError};

/// Identifier assigned by the user store; immutable once created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct UserId(u64);

impl UserId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stored password state.
#[derive(Clone, PartialEq, Eq)]
pub enum Password {
    /// No password can log in; set right after first-step registration.
    Unusable,
    /// Argon2 PHC string.
    Hashed(String),
}

const UNUSABLE_PASSWORD_MARKER: &str = "!";

impl Password {
    /// # Errors
    /// Returns `Error::PasswordHash` if Argon2 fails.
    pub fn hash(raw: &str) -> Result<Self, Error> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(raw.as_bytes(), &salt)
            .map_err(|_| Error::PasswordHash)?;
        Ok(Self::Hashed(hash.to_string()))
    }

    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Hashed(_))
    }

    #[must_use]
    pub fn verify(&self, raw: &str) -> bool {
        let Self::Hashed(stored) = self else {
            return false;
        };
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        Argon2::default()
            .verify_password(raw.as_bytes(), &parsed)
            .is_ok()
    }

    /// Stable string describing the current state; changes whenever the
    /// password is set or made unusable.
    #[must_use]
    pub fn state_marker(&self) -> &str {
        match self {
            Self::Unusable => UNUSABLE_PASSWORD_MARKER,
            Self::Hashed(hash) => hash,
        }
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unusable => f.write_str("Unusable"),
            Self::Hashed(_) => f.write_str("Hashed(***)"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password: Password,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// # Errors
    /// Returns `Error::PasswordHash` if hashing fails.
    pub fn set_password(&mut self, raw: &str) -> Result<(), Error> {
        self.password = Password::hash(raw)?;
        Ok(())
    }

    pub fn set_unusable_password(&mut self) {
        self.password = Password::Unusable;
    }

    #[must_use]
    pub fn has_usable_password(&self) -> bool {
        self.password.is_usable()
    }

    #[must_use]
    pub fn check_password(&self, raw: &str) -> bool {
        self.password.verify(raw)
    }
}

/// Input for [`UserStore::create`].
#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: Password,
}

/// Persistence seam; the hosting application supplies the real one.
pub trait UserStore: Send + Sync {
    /// # Errors
    /// `StoreError::UsernameTaken` when the username already exists.
    fn create(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    /// # Errors
    /// Backend failures only; a missing user is `Ok(None)`.
    fn get(&self, id: UserId) -> Result<Option<UserRecord>, StoreError>;

    /// # Errors
    /// Backend failures only.
    fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// # Errors
    /// Backend failures only.
    fn username_exists_ignore_case(&self, username: &str) -> Result<bool, StoreError>;

    /// # Errors
    /// Backend failures only.
    fn email_exists_ignore_case(&self, email: &str) -> Result<bool, StoreError>;

    /// # Errors
    /// `StoreError::NotFound` for unknown ids, `StoreError::UsernameTaken`
    /// when renaming onto an existing username.
    fn save(&self, user: &UserRecord) -> Result<(), StoreError>;
}

/// In-process store with sequential ids.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    inner: Mutex<MemoryUsers>,
}

#[derive(Debug, Default)]
struct MemoryUsers {
    last_id: u64,
    users: BTreeMap<UserId, UserRecord>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .users
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoryUsers {
    fn username_owner(&self, username: &str) -> Option<UserId> {
        self.users
            .values()
            .find(|user| user.username == username)
            .map(|user| user.id)
    }
}

impl UserStore for MemoryUserStore {
    fn create(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.username_owner(&user.username).is_some() {
            return Err(StoreError::UsernameTaken(user.username));
        }

        inner.last_id += 1;
        let record = UserRecord {
            id: UserId::new(inner.last_id),
            username: user.username,
            email: user.email,
            password: user.password,
            date_joined: Utc::now(),
            last_login: None,
        };
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    fn get(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.users.get(&id).cloned())
    }

    fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    fn username_exists_ignore_case(&self, username: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .users
            .values()
            .any(|user| user.username.eq_ignore_ascii_case(username)))
    }

    fn email_exists_ignore_case(&self, email: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .users
            .values()
            .any(|user| user.email.eq_ignore_ascii_case(email)))
    }

    fn save(&self, user: &UserRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.users.contains_key(&user.id) {
            return Err(StoreError::NotFound(user.id));
        }
        if inner
            .username_owner(&user.username)
            .is_some_and(|owner| owner != user.id)
        {
            return Err(StoreError::UsernameTaken(user.username.clone()));
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password: Password::Unusable,
        }
    }

    #[test]
    fn password_hash_and_verify() -> Result<()> {
        let password = Password::hash("pass")?;
        assert!(password.is_usable());
        assert!(password.verify("pass"));
        assert!(!password.verify("wrong"));
        assert_ne!(password.state_marker(), UNUSABLE_PASSWORD_MARKER);
        Ok(())
    }

    #[test]
    fn unusable_password_never_verifies() {
        let password = Password::Unusable;
        assert!(!password.is_usable());
        assert!(!password.verify(""));
        assert!(!password.verify("!"));
        assert_eq!(password.state_marker(), "!");
    }

    #[test]
    fn password_debug_hides_hash() -> Result<()> {
        let password = Password::hash("pass")?;
        assert_eq!(format!("{password:?}"), "Hashed(***)");
        Ok(())
    }

    #[test]
    fn create_assigns_sequential_ids() -> Result<()> {
        let store = MemoryUserStore::new();
        let first = store.create(new_user("one", "one@example.com"))?;
        let second = store.create(new_user("two", "two@example.com"))?;
        assert_eq!(first.id, UserId::new(1));
        assert_eq!(second.id, UserId::new(2));
        assert_eq!(store.len(), 2);
        assert!(first.last_login.is_none());
        Ok(())
    }

    #[test]
    fn create_rejects_duplicate_username() -> Result<()> {
        let store = MemoryUserStore::new();
        store.create(new_user("one", "one@example.com"))?;
        let result = store.create(new_user("one", "other@example.com"));
        assert_eq!(result, Err(StoreError::UsernameTaken("one".to_string())));
        Ok(())
    }

    #[test]
    fn lookups_by_id_and_username() -> Result<()> {
        let store = MemoryUserStore::new();
        let created = store.create(new_user("Alice", "alice@example.com"))?;

        assert_eq!(store.get(created.id)?, Some(created.clone()));
        assert_eq!(store.get(UserId::new(99))?, None);
        assert_eq!(store.get_by_username("Alice")?, Some(created));
        assert_eq!(store.get_by_username("alice")?, None);
        assert!(store.username_exists_ignore_case("ALICE")?);
        assert!(store.email_exists_ignore_case("Alice@Example.com")?);
        assert!(!store.email_exists_ignore_case("bob@example.com")?);
        Ok(())
    }

    #[test]
    fn save_updates_and_guards_usernames() -> Result<()> {
        let store = MemoryUserStore::new();
        let mut alice = store.create(new_user("alice", "alice@example.com"))?;
        store.create(new_user("bob", "bob@example.com"))?;

        alice.username = "alicia".to_string();
        store.save(&alice)?;
        assert_eq!(
            store.get(alice.id)?.map(|user| user.username),
            Some("alicia".to_string())
        );

        alice.username = "bob".to_string();
        assert_eq!(
            store.save(&alice),
            Err(StoreError::UsernameTaken("bob".to_string()))
        );

        let mut ghost = alice.clone();
        ghost.id = UserId::new(42);
        assert_eq!(store.save(&ghost), Err(StoreError::NotFound(UserId::new(42))));
        Ok(())
    }

    #[test]
    fn user_record_password_helpers() -> Result<()> {
        let store = MemoryUserStore::new();
        let mut user = store.create(new_user("carol", "carol@example.com"))?;
        assert!(!user.has_usable_password());

        user.set_password("secret")?;
        assert!(user.has_usable_password());
        assert!(user.check_password("secret"));

        user.set_unusable_password();
        assert!(!user.check_password("secret"));
        Ok(())
    }
}
