pub mod keyring;

pub use self::keyring::{
    KeyringSlot, MemorySlot, SecretSlot, SessionCache, SigningKeyVault,
};
