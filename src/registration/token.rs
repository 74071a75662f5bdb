//! State-bound activation tokens.
//!
//! A token is `<timestamp base36>-<mac>` where the MAC covers the user id,
//! the password state, the last login, and the timestamp. Setting a password
//! or logging in changes the MAC input, so earlier tokens stop verifying.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::config::SecretKey;
use super::error::ConfigError;
use super::store::UserRecord;

type HmacSha256 = Hmac<Sha256>;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
const BASE36_DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Produces and checks tokens bound to a user's mutable state.
pub trait TokenGenerator: Send + Sync {
    fn make_token(&self, user: &UserRecord) -> String;

    /// `true` only if `token` was made for the user's *current* state and has
    /// not expired.
    fn check_token(&self, user: &UserRecord, token: &str) -> bool;
}

#[derive(Clone)]
pub struct HmacTokenGenerator {
    mac: HmacSha256,
    timeout_seconds: i64,
}

impl HmacTokenGenerator {
    /// # Errors
    /// Returns `ConfigError::KeyMaterial` if the derived key is rejected.
    pub fn new(secret: &SecretKey, timeout_days: u32) -> Result<Self, ConfigError> {
        let key = secret.derive("emailfirst.activation-token");
        let mac = HmacSha256::new_from_slice(&key)
            .map_err(|err| ConfigError::KeyMaterial(err.to_string()))?;
        Ok(Self {
            mac,
            timeout_seconds: i64::from(timeout_days) * SECONDS_PER_DAY,
        })
    }

    pub(crate) fn token_with_timestamp(&self, user: &UserRecord, timestamp: i64) -> String {
        let mut mac = self.mac.clone();
        mac.update(user.id.get().to_string().as_bytes());
        mac.update(b"|");
        mac.update(user.password.state_marker().as_bytes());
        mac.update(b"|");
        let last_login = user
            .last_login
            .map_or_else(String::new, |at| at.timestamp_micros().to_string());
        mac.update(last_login.as_bytes());
        mac.update(b"|");
        mac.update(timestamp.to_string().as_bytes());

        let digest = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());
        format!("{}-{digest}", to_base36(timestamp))
    }
}

impl TokenGenerator for HmacTokenGenerator {
    fn make_token(&self, user: &UserRecord) -> String {
        self.token_with_timestamp(user, Utc::now().timestamp())
    }

    fn check_token(&self, user: &UserRecord, token: &str) -> bool {
        let Some((encoded_ts, _)) = token.split_once('-') else {
            return false;
        };
        let Some(timestamp) = from_base36(encoded_ts) else {
            return false;
        };

        let expected = self.token_with_timestamp(user, timestamp);
        if !bool::from(expected.as_bytes().ct_eq(token.as_bytes())) {
            return false;
        }

        Utc::now().timestamp().saturating_sub(timestamp) <= self.timeout_seconds
    }
}

impl std::fmt::Debug for HmacTokenGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacTokenGenerator")
            .field("timeout_seconds", &self.timeout_seconds)
            .finish_non_exhaustive()
    }
}

fn to_base36(value: i64) -> String {
    let mut remaining = value.unsigned_abs();
    let mut digits = Vec::new();
    loop {
        let index = usize::try_from(remaining % 36).unwrap_or(0);
        digits.push(BASE36_DIGITS.get(index).copied().unwrap_or(b'0'));
        remaining /= 36;
        if remaining == 0 {
            break;
        }
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

fn from_base36(text: &str) -> Option<i64> {
    // 13 base36 digits cover every positive i64
    if text.is_empty() || text.len() > 13 {
        return None;
    }
    if !text.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()) {
        return None;
    }
    i64::from_str_radix(text, 36).ok()
}
