//! Reversible obfuscation of numeric user ids.
//!
//! The decimal form of the id is padded with spaces to whole AES blocks,
//! encrypted block by block, and written as RFC 4648 base32 with `'='`
//! replaced by `'0'`. The output only uses `[A-Z2-7]` and `'0'`, so it never
//! needs URL escaping and never contains the activation key separator.
//!
//! This is obfuscation against enumeration of activation links, not a
//! security boundary: the token carried next to the uid is what proves
//! validity.

use aes::{
    Aes128, Block,
    cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray},
};
use base32::Alphabet;

use super::config::SecretKey;
use super::error::DecodeError;
use super::store::UserId;

const BLOCK_SIZE: usize = 16;
const PAD: u8 = b' ';
const ENCODING: Alphabet = Alphabet::Rfc4648 { padding: true };
const ENCODING_PAD: char = '=';
const ENCODED_ALIGNMENT: usize = 8;

/// Stands in for the base32 padding character.
pub const PAD_SUBSTITUTE: char = '0';

/// Keyed codec between [`UserId`] and its uid string.
///
/// Built once at startup; the cipher is stateless per call so a shared
/// reference is safe across request threads.
#[derive(Clone)]
pub struct UidCodec {
    cipher: Aes128,
}

impl UidCodec {
    #[must_use]
    pub fn new(secret: &SecretKey) -> Self {
        let key = secret.derive("emailfirst.uid");
        Self {
            cipher: Aes128::new(GenericArray::from_slice(&key[..BLOCK_SIZE])),
        }
    }

    /// Deterministic for a fixed id and secret.
    #[must_use]
    pub fn encode(&self, id: UserId) -> String {
        let mut buffer = id.get().to_string().into_bytes();
        let padded_len = buffer.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        buffer.resize(padded_len, PAD);

        for chunk in buffer.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher.encrypt_block(Block::from_mut_slice(chunk));
        }

        base32::encode(ENCODING, &buffer).replace(ENCODING_PAD, "0")
    }

    /// # Errors
    /// Returns a [`DecodeError`] when any stage fails; callers treat this as
    /// "no such user".
    pub fn decode(&self, uid: &str) -> Result<UserId, DecodeError> {
        if uid.is_empty() || uid.len() % ENCODED_ALIGNMENT != 0 {
            return Err(DecodeError::InvalidLength);
        }
        if !uid
            .bytes()
            .all(|b| matches!(b, b'A'..=b'Z' | b'2'..=b'7') || char::from(b) == PAD_SUBSTITUTE)
        {
            return Err(DecodeError::InvalidAlphabet);
        }

        // Padding may only appear at the end.
        let restored = uid.replace(PAD_SUBSTITUTE, "=");
        if restored.trim_end_matches(ENCODING_PAD).contains(ENCODING_PAD) {
            return Err(DecodeError::InvalidAlphabet);
        }

        let mut buffer = base32::decode(ENCODING, &restored).ok_or(DecodeError::InvalidEncoding)?;
        if buffer.is_empty() || buffer.len() % BLOCK_SIZE != 0 {
            return Err(DecodeError::InvalidLength);
        }

        for chunk in buffer.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher.decrypt_block(Block::from_mut_slice(chunk));
        }

        let digits_len = buffer
            .iter()
            .rposition(|&b| b != PAD)
            .map_or(0, |last| last + 1);
        buffer.truncate(digits_len);

        let id = UserId::new(parse_digits(&buffer)?);
        // base32 ignores trailing bits; only the canonical spelling is accepted
        if self.encode(id) != uid {
            return Err(DecodeError::InvalidEncoding);
        }
        Ok(id)
    }
}

impl std::fmt::Debug for UidCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UidCodec").finish_non_exhaustive()
    }
}

fn parse_digits(digits: &[u8]) -> Result<u64, DecodeError> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::InvalidPayload);
    }
    // encode never emits leading zeros
    if digits.len() > 1 && digits.first() == Some(&b'0') {
        return Err(DecodeError::InvalidPayload);
    }
    std::str::from_utf8(digits)
        .ok()
        .and_then(|text| text.parse::<u64>().ok())
        .ok_or(DecodeError::InvalidPayload)
}
