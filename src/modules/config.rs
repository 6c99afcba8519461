use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::modules::auth::password::PBKDF2_ROUNDS;
use crate::modules::auth::tokens::{TokenLifetimes, MIN_SECRET_LEN};
use crate::modules::email::MailContext;
use crate::modules::error::{AccountError, AccountResult};
use crate::modules::security::SigningKeyVault;
use crate::{DEFAULT_USERS_FILE, MAX_PAGE_SIZE};

/// Hex-encoded master signing secret; takes precedence over the keyring
pub const SIGNING_KEY_ENV: &str = "HACKBOARD_SIGNING_KEY";

/// Settings for the account service and its command-line front-end
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub data_file: PathBuf,
    pub app_url: String,
    pub tokens: TokenLifetimes,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub mail_from_name: String,
    /// Sender address; the SMTP login is used when unset
    pub mail_from_address: Option<String>,
    /// Deliver mail over SMTP when credentials are stored; log it otherwise
    pub mail_enabled: bool,
    pub max_page_size: usize,
    pub password_rounds: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(DEFAULT_USERS_FILE),
            app_url: "http://localhost:3000".to_string(),
            tokens: TokenLifetimes::default(),
            log_level: "info".to_string(),
            log_file: None,
            mail_from_name: "Hackboard".to_string(),
            mail_from_address: None,
            mail_enabled: true,
            max_page_size: MAX_PAGE_SIZE,
            password_rounds: PBKDF2_ROUNDS,
        }
    }
}

impl ServiceConfig {
    /// Load settings from a JSON file; a missing file yields the defaults
    pub fn load(path: &Path) -> AccountResult<Self> {
        let config = match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                AccountError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Write settings as pretty JSON
    pub fn save(&self, path: &Path) -> AccountResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply `HACKBOARD_*` environment overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(file) = lookup("HACKBOARD_DATA_FILE") {
            self.data_file = PathBuf::from(file);
        }
        if let Some(url) = lookup("HACKBOARD_APP_URL") {
            self.app_url = url;
        }
        if let Some(level) = lookup("HACKBOARD_LOG") {
            self.log_level = level;
        }
        if let Some(enabled) = lookup("HACKBOARD_MAIL_ENABLED") {
            self.mail_enabled = !matches!(enabled.to_lowercase().as_str(), "0" | "false" | "no");
        }
        self
    }

    pub fn validate(&self) -> AccountResult<()> {
        let tokens = &self.tokens;
        if tokens.session_secs == 0 || tokens.verification_secs == 0 || tokens.reset_secs == 0 {
            return Err(AccountError::Config(
                "Token lifetimes must be greater than zero".to_string(),
            ));
        }
        if self.max_page_size == 0 {
            return Err(AccountError::Config(
                "max_page_size must be greater than zero".to_string(),
            ));
        }
        if self.max_page_size > MAX_PAGE_SIZE {
            return Err(AccountError::Config(format!(
                "max_page_size cannot exceed {}",
                MAX_PAGE_SIZE
            )));
        }
        if self.password_rounds == 0 {
            return Err(AccountError::Config(
                "password_rounds must be greater than zero".to_string(),
            ));
        }
        if self.app_url.trim().is_empty() {
            return Err(AccountError::Config("app_url cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn mail_context(&self) -> MailContext {
        MailContext {
            app_url: self.app_url.clone(),
            verification_lifetime_secs: self.tokens.verification_secs,
            reset_lifetime_secs: self.tokens.reset_secs,
        }
    }
}

/// Decode a hex master secret taken from the environment
pub fn decode_signing_secret(encoded: &str) -> AccountResult<Vec<u8>> {
    let secret = hex::decode(encoded.trim()).map_err(|e| {
        AccountError::Config(format!("{} is not valid hex: {}", SIGNING_KEY_ENV, e))
    })?;
    if secret.len() < MIN_SECRET_LEN {
        return Err(AccountError::Config(format!(
            "{} must hold at least {} bytes",
            SIGNING_KEY_ENV, MIN_SECRET_LEN
        )));
    }
    Ok(secret)
}

/// The master signing secret: `HACKBOARD_SIGNING_KEY` if set, else the keyring
pub fn load_signing_secret() -> AccountResult<Vec<u8>> {
    match std::env::var(SIGNING_KEY_ENV) {
        Ok(encoded) => decode_signing_secret(&encoded),
        Err(_) => SigningKeyVault::from_keyring()?.get_or_initialize(),
    }
}
