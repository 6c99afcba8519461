use keyring::Entry;
use rand::random;
use std::sync::Mutex;

use crate::modules::auth::tokens::{SessionToken, MIN_SECRET_LEN};
use crate::modules::error::{AccountError, AccountResult};
use crate::KEYRING_SERVICE;

/// One secret string in secure storage
pub trait SecretSlot {
    fn get(&self) -> AccountResult<Option<String>>;
    fn set(&self, value: &str) -> AccountResult<()>;
    fn delete(&self) -> AccountResult<()>;
}

/// A slot backed by the system keyring
pub struct KeyringSlot {
    entry: Entry,
}

impl KeyringSlot {
    pub fn new(name: &str) -> AccountResult<Self> {
        Ok(Self {
            entry: Entry::new(KEYRING_SERVICE, name)?,
        })
    }
}

impl SecretSlot for KeyringSlot {
    fn get(&self) -> AccountResult<Option<String>> {
        match self.entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, value: &str) -> AccountResult<()> {
        Ok(self.entry.set_password(value)?)
    }

    fn delete(&self) -> AccountResult<()> {
        match self.entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A slot held in process memory
#[derive(Default)]
pub struct MemorySlot {
    value: Mutex<Option<String>>,
}

impl SecretSlot for MemorySlot {
    fn get(&self) -> AccountResult<Option<String>> {
        self.value
            .lock()
            .map(|v| v.clone())
            .map_err(|_| AccountError::Storage("secret slot lock poisoned".to_string()))
    }

    fn set(&self, value: &str) -> AccountResult<()> {
        let mut slot = self
            .value
            .lock()
            .map_err(|_| AccountError::Storage("secret slot lock poisoned".to_string()))?;
        *slot = Some(value.to_string());
        Ok(())
    }

    fn delete(&self) -> AccountResult<()> {
        let mut slot = self
            .value
            .lock()
            .map_err(|_| AccountError::Storage("secret slot lock poisoned".to_string()))?;
        *slot = None;
        Ok(())
    }
}

/// The master secret every token signing key is derived from
pub struct SigningKeyVault<S = KeyringSlot> {
    slot: S,
}

impl SigningKeyVault<KeyringSlot> {
    pub fn from_keyring() -> AccountResult<Self> {
        Ok(Self::new(KeyringSlot::new("signing-key")?))
    }
}

impl<S: SecretSlot> SigningKeyVault<S> {
    pub fn new(slot: S) -> Self {
        Self { slot }
    }

    /// Store a master secret, hex-encoded
    pub fn store_key(&self, key: &[u8]) -> AccountResult<()> {
        self.slot.set(&hex::encode(key))
    }

    /// The stored master secret, if any
    pub fn get_key(&self) -> AccountResult<Option<Vec<u8>>> {
        match self.slot.get()? {
            Some(encoded) => hex::decode(encoded.trim())
                .map(Some)
                .map_err(|e| AccountError::Config(format!("Stored signing key is not hex: {}", e))),
            None => Ok(None),
        }
    }

    /// Return the master secret, generating and storing a 32-byte one on first use
    pub fn get_or_initialize(&self) -> AccountResult<Vec<u8>> {
        if let Some(key) = self.get_key()? {
            if key.len() >= MIN_SECRET_LEN {
                return Ok(key);
            }
            log::warn!("Stored signing key is too short; generating a new one");
        }

        let new_key: Vec<u8> = (0..32).map(|_| random::<u8>()).collect();
        self.store_key(&new_key)?;
        log::info!("New signing key generated and stored");
        Ok(new_key)
    }
}

/// The session token of the signed-in command-line user
pub struct SessionCache<S = KeyringSlot> {
    slot: S,
}

impl SessionCache<KeyringSlot> {
    pub fn from_keyring() -> AccountResult<Self> {
        Ok(Self::new(KeyringSlot::new("session-token")?))
    }
}

impl<S: SecretSlot> SessionCache<S> {
    pub fn new(slot: S) -> Self {
        Self { slot }
    }

    pub fn store(&self, token: &SessionToken) -> AccountResult<()> {
        self.slot.set(token.as_str())
    }

    pub fn load(&self) -> AccountResult<Option<SessionToken>> {
        Ok(self
            .slot
            .get()?
            .filter(|raw| !raw.trim().is_empty())
            .map(SessionToken::parse))
    }

    pub fn clear(&self) -> AccountResult<()> {
        self.slot.delete()
    }
}
