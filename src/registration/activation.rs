//! Activation keys: `<uid>-<token>`.

use std::sync::Arc;
use tracing::debug;

use super::error::StoreError;
use super::store::{UserRecord, UserStore};
use super::token::TokenGenerator;
use super::uid::UidCodec;

/// Never part of a uid, may appear inside a token.
pub const ACTIVATION_KEY_SEPARATOR: char = '-';

#[derive(Clone)]
pub struct ActivationKeys {
    codec: Arc<UidCodec>,
    tokens: Arc<dyn TokenGenerator>,
    users: Arc<dyn UserStore>,
}

impl ActivationKeys {
    #[must_use]
    pub fn new(
        codec: Arc<UidCodec>,
        tokens: Arc<dyn TokenGenerator>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            codec,
            tokens,
            users,
        }
    }

    /// Build the key for the user's current state.
    #[must_use]
    pub fn emit(&self, user: &UserRecord) -> String {
        let uid = self.codec.encode(user.id);
        let token = self.tokens.make_token(user);
        format!("{uid}{ACTIVATION_KEY_SEPARATOR}{token}")
    }

    /// Resolve a key back to its user without mutating anything.
    ///
    /// Malformed, tampered, expired, or already used keys resolve to
    /// `Ok(None)`.
    ///
    /// # Errors
    /// Only when the user store itself fails.
    pub fn resolve(&self, key: &str) -> Result<Option<UserRecord>, StoreError> {
        let Some((uid, token)) = key.split_once(ACTIVATION_KEY_SEPARATOR) else {
            debug!("activation key has no separator");
            return Ok(None);
        };

        let id = match self.codec.decode(uid) {
            Ok(id) => id,
            Err(err) => {
                debug!("activation key uid rejected: {err}");
                return Ok(None);
            }
        };

        let Some(user) = self.users.get(id)? else {
            debug!(user_id = %id, "activation key references unknown user");
            return Ok(None);
        };

        if !self.tokens.check_token(&user, token) {
            debug!(user_id = %id, "activation token rejected");
            return Ok(None);
        }

        Ok(Some(user))
    }
}

impl std::fmt::Debug for ActivationKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationKeys").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::config::SecretKey;
    use crate::registration::store::{MemoryUserStore, NewUser, Password, UserId};
    use crate::registration::token::HmacTokenGenerator;
    use anyhow::Result;
    use secrecy::SecretString;

    struct Fixture {
        keys: ActivationKeys,
        codec: Arc<UidCodec>,
        users: Arc<MemoryUserStore>,
    }

    fn fixture() -> Result<Fixture> {
        let secret = SecretKey::new(SecretString::from("shhh secret"))?;
        let codec = Arc::new(UidCodec::new(&secret));
        let tokens = Arc::new(HmacTokenGenerator::new(&secret, 3)?);
        let users = Arc::new(MemoryUserStore::new());
        let keys = ActivationKeys::new(codec.clone(), tokens, users.clone());
        Ok(Fixture { keys, codec, users })
    }

    fn create_user(users: &MemoryUserStore, username: &str) -> Result<UserRecord> {
        Ok(users.create(NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: Password::Unusable,
        })?)
    }

    #[test]
    fn emit_then_resolve_returns_user() -> Result<()> {
        let fx = fixture()?;
        let user = create_user(&fx.users, "first")?;
        let key = fx.keys.emit(&user);

        let (uid, token) = key
            .split_once(ACTIVATION_KEY_SEPARATOR)
            .ok_or_else(|| anyhow::anyhow!("missing separator"))?;
        assert_eq!(fx.codec.decode(uid), Ok(user.id));
        assert!(!token.is_empty());

        assert_eq!(fx.keys.resolve(&key)?, Some(user.clone()));
        // idempotent
        assert_eq!(fx.keys.resolve(&key)?, Some(user));
        Ok(())
    }

    #[test]
    fn tokens_with_separator_still_resolve() -> Result<()> {
        let fx = fixture()?;
        let user = create_user(&fx.users, "dash")?;
        let key = fx.keys.emit(&user);
        // uid separator plus at least the timestamp separator inside the token
        assert!(key.matches(ACTIVATION_KEY_SEPARATOR).count() >= 2);
        assert!(fx.keys.resolve(&key)?.is_some());
        Ok(())
    }

    #[test]
    fn key_without_separator_is_rejected() -> Result<()> {
        let fx = fixture()?;
        create_user(&fx.users, "nosep")?;
        assert_eq!(fx.keys.resolve("ABCDEFGH")?, None);
        assert_eq!(fx.keys.resolve("")?, None);
        Ok(())
    }

    #[test]
    fn undecodable_uid_is_rejected() -> Result<()> {
        let fx = fixture()?;
        let user = create_user(&fx.users, "baduid")?;
        let key = fx.keys.emit(&user);
        let token = key
            .split_once(ACTIVATION_KEY_SEPARATOR)
            .map(|(_, token)| token.to_string())
            .unwrap_or_default();

        assert_eq!(fx.keys.resolve(&format!("not-a-uid-{token}"))?, None);
        assert_eq!(fx.keys.resolve(&format!("abc-{token}"))?, None);
        Ok(())
    }

    #[test]
    fn unknown_user_is_rejected() -> Result<()> {
        let fx = fixture()?;
        let user = create_user(&fx.users, "known")?;
        let key = fx.keys.emit(&user);
        let token = key
            .split_once(ACTIVATION_KEY_SEPARATOR)
            .map(|(_, token)| token.to_string())
            .unwrap_or_default();

        let missing_uid = fx.codec.encode(UserId::new(999));
        assert_eq!(fx.keys.resolve(&format!("{missing_uid}-{token}"))?, None);
        Ok(())
    }

    #[test]
    fn token_for_other_user_is_rejected() -> Result<()> {
        let fx = fixture()?;
        let alice = create_user(&fx.users, "alice")?;
        let bob = create_user(&fx.users, "bob")?;
        let alice_key = fx.keys.emit(&alice);
        let alice_token = alice_key
            .split_once(ACTIVATION_KEY_SEPARATOR)
            .map(|(_, token)| token.to_string())
            .unwrap_or_default();

        let forged = format!("{}-{alice_token}", fx.codec.encode(bob.id));
        assert_eq!(fx.keys.resolve(&forged)?, None);
        Ok(())
    }

    #[test]
    fn key_stops_resolving_after_password_is_set() -> Result<()> {
        let fx = fixture()?;
        let mut user = create_user(&fx.users, "replay")?;
        let key = fx.keys.emit(&user);
        assert!(fx.keys.resolve(&key)?.is_some());

        user.set_password("pass")?;
        fx.users.save(&user)?;
        assert_eq!(fx.keys.resolve(&key)?, None);
        Ok(())
    }
}
