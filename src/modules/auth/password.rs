use pbkdf2::pbkdf2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use subtle::ConstantTimeEq;

use crate::modules::error::{AccountError, AccountResult};
use crate::{HmacSha256, MIN_PASSWORD_LENGTH};

/// Default PBKDF2 iteration count for new hashes
pub const PBKDF2_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Salted PBKDF2-HMAC-SHA256 password hash as stored on a user record
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PasswordHash {
    pub salt: String,
    pub hash: String,
    pub rounds: u32,
}

/// Check that a password is present and long enough
pub fn validate_password(password: &str) -> AccountResult<()> {
    if password.is_empty() {
        return Err(AccountError::MissingField("Password"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AccountError::PasswordTooShort);
    }
    Ok(())
}

fn derive_key(password: &str, salt: &[u8], rounds: NonZeroU32) -> Vec<u8> {
    let mut key = vec![0u8; KEY_LEN];
    pbkdf2::<HmacSha256>(password.as_bytes(), salt, rounds.get(), &mut key);
    key
}

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str) -> PasswordHash {
    hash_password_with_rounds(password, PBKDF2_ROUNDS)
}

/// Hash with an explicit iteration count; the count is stored alongside the hash
pub fn hash_password_with_rounds(password: &str, rounds: u32) -> PasswordHash {
    let salt: [u8; SALT_LEN] = rand::thread_rng().gen();
    let rounds = NonZeroU32::new(rounds).unwrap_or(NonZeroU32::MIN);
    let key = derive_key(password, &salt, rounds);

    PasswordHash {
        salt: hex::encode(salt),
        hash: hex::encode(key),
        rounds: rounds.get(),
    }
}

/// Compare a candidate password against a stored hash in constant time
pub fn verify_password(password: &str, stored: &PasswordHash) -> AccountResult<bool> {
    let salt = hex::decode(&stored.salt)
        .map_err(|e| AccountError::Storage(format!("Corrupt password salt: {}", e)))?;
    let expected = hex::decode(&stored.hash)
        .map_err(|e| AccountError::Storage(format!("Corrupt password hash: {}", e)))?;
    let rounds = NonZeroU32::new(stored.rounds)
        .ok_or_else(|| AccountError::Storage("Password hash has zero rounds".to_string()))?;

    let candidate = derive_key(password, &salt, rounds);
    Ok(candidate.ct_eq(&expected).into())
}
