use keyring::Entry;

use super::smtp::SmtpCredentials;
use crate::modules::error::{AccountError, AccountResult};
use crate::modules::utils::time::get_current_timestamp;
use crate::KEYRING_SERVICE;

/// Keeps SMTP credentials in the system keyring
pub struct SecureEmailManager {
    keyring: Entry,
}

impl SecureEmailManager {
    pub fn new() -> AccountResult<Self> {
        Ok(Self {
            keyring: Entry::new(KEYRING_SERVICE, "smtp-credentials")?,
        })
    }

    // Store new SMTP credentials in the system keyring
    pub fn store_credentials(
        &self,
        username: &str,
        password: &str,
        host: &str,
        port: u16,
    ) -> AccountResult<()> {
        let credentials = SmtpCredentials {
            username: username.to_string(),
            password: password.to_string(),
            host: host.to_string(),
            port,
            last_updated: get_current_timestamp(),
        };

        self.keyring
            .set_password(&encode_credentials(&credentials)?)?;
        Ok(())
    }

    /// Stored credentials, or `None` if email was never set up
    pub fn get_credentials(&self) -> AccountResult<Option<SmtpCredentials>> {
        match self.keyring.get_password() {
            Ok(json) => decode_credentials(&json).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete_credentials(&self) -> AccountResult<()> {
        match self.keyring.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn encode_credentials(credentials: &SmtpCredentials) -> AccountResult<String> {
    Ok(serde_json::to_string(credentials)?)
}

fn decode_credentials(json: &str) -> AccountResult<SmtpCredentials> {
    serde_json::from_str(json)
        .map_err(|e| AccountError::Config(format!("Failed to parse SMTP credentials: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_roundtrip_through_keyring_format() {
        let credentials = SmtpCredentials {
            username: "noreply@example.com".to_string(),
            password: "app-password".to_string(),
            host: "smtp.example.com".to_string(),
            port: 587,
            last_updated: 1_700_000_000,
        };

        let json = encode_credentials(&credentials).unwrap();
        let decoded = decode_credentials(&json).unwrap();

        assert_eq!(decoded.username, "noreply@example.com");
        assert_eq!(decoded.password, "app-password");
        assert_eq!(decoded.host, "smtp.example.com");
        assert_eq!(decoded.port, 587);
        assert_eq!(decoded.last_updated, 1_700_000_000);
    }

    #[test]
    fn test_garbage_keyring_entry_is_a_config_error() {
        assert!(matches!(
            decode_credentials("not json"),
            Err(AccountError::Config(_))
        ));
    }
}
