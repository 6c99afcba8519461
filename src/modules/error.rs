use serde::Serialize;
use std::io;
use thiserror::Error;

use crate::MIN_PASSWORD_LENGTH;

/// Every failure an account operation can surface.
///
/// The `Display` text is the human-readable message handed back to callers,
/// so variants are worded for end users rather than operators.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Password must be at least {} characters", MIN_PASSWORD_LENGTH)]
    PasswordTooShort,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("An account with that email already exists")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Token is invalid")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("User not found")]
    UserNotFound,

    // Profile updates only match verified accounts.
    #[error("No verified account matches that user")]
    NotVerified,

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("Invalid page request: {0}")]
    InvalidPage(String),

    #[error("Failed to send email: {0}")]
    Mail(String),

    #[error("Failed to send email: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Invalid email address: {0}")]
    MailAddress(#[from] lettre::address::AddressError),

    #[error("Failed to create email: {0}")]
    MailMessage(#[from] lettre::error::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl AccountError {
    /// The message field returned to callers
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether the failure came from caller input rather than a collaborator
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AccountError::MissingField(_)
                | AccountError::PasswordTooShort
                | AccountError::InvalidEmail
                | AccountError::InvalidProfile(_)
                | AccountError::InvalidSubmission(_)
                | AccountError::InvalidPage(_)
        )
    }
}

/// Outward error shape: a single `message` field
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

impl From<&AccountError> for ErrorBody {
    fn from(error: &AccountError) -> Self {
        Self {
            message: error.message(),
        }
    }
}

pub type AccountResult<T> = Result<T, AccountError>;
