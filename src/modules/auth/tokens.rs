use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::Mac;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

use crate::modules::error::{AccountError, AccountResult};
use crate::modules::utils::time::get_current_timestamp;
use crate::HmacSha256;

/// Shortest master secret accepted for signing
pub const MIN_SECRET_LEN: usize = 16;

/// A token purpose. Each purpose signs with its own derived key, so a token
/// minted for one purpose never verifies as another.
pub trait TokenPurpose {
    const LABEL: &'static str;

    /// Lifetime in seconds for tokens of this purpose
    fn lifetime(lifetimes: &TokenLifetimes) -> u64;
}

/// Login session, subject is the user id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {}

/// Proof of email ownership, subject is the normalized email
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailVerification {}

/// One password change, subject is the user id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordReset {}

impl TokenPurpose for Session {
    const LABEL: &'static str = "session";

    fn lifetime(lifetimes: &TokenLifetimes) -> u64 {
        lifetimes.session_secs
    }
}

impl TokenPurpose for EmailVerification {
    const LABEL: &'static str = "email-verification";

    fn lifetime(lifetimes: &TokenLifetimes) -> u64 {
        lifetimes.verification_secs
    }
}

impl TokenPurpose for PasswordReset {
    const LABEL: &'static str = "password-reset";

    fn lifetime(lifetimes: &TokenLifetimes) -> u64 {
        lifetimes.reset_secs
    }
}

/// Opaque signed token tagged with its purpose at the type level
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token<P> {
    value: String,
    #[serde(skip)]
    purpose: PhantomData<fn() -> P>,
}

pub type SessionToken = Token<Session>;
pub type VerificationToken = Token<EmailVerification>;
pub type ResetToken = Token<PasswordReset>;

impl<P> Token<P> {
    /// Wrap a raw token string received from a caller
    pub fn parse(value: impl Into<String>) -> Self {
        Self {
            value: value.into().trim().to_string(),
            purpose: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl<P> Clone for Token<P> {
    fn clone(&self) -> Self {
        Self::parse(self.value.clone())
    }
}

impl<P> PartialEq for Token<P> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<P> Eq for Token<P> {}

impl<P> fmt::Debug for Token<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the full credential
        let prefix: String = self.value.chars().take(8).collect();
        write!(f, "Token({}…)", prefix)
    }
}

impl<P> fmt::Display for Token<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Lifetimes for each token purpose, in seconds
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TokenLifetimes {
    pub session_secs: u64,
    pub verification_secs: u64,
    pub reset_secs: u64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            session_secs: 7 * 86400,
            verification_secs: 86400,
            reset_secs: 1800,
        }
    }
}

/// Verified contents of a token
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    pub subject: String,
    pub token_id: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

#[derive(Serialize, Deserialize)]
struct WireClaims {
    pur: String,
    sub: String,
    jti: String,
    iat: u64,
    exp: u64,
}

/// A freshly minted token together with its claims
#[derive(Debug, Clone)]
pub struct IssuedToken<P> {
    pub token: Token<P>,
    pub claims: Claims,
}

/// Signs and verifies purpose-tagged tokens with HMAC-SHA256
pub struct TokenSigner {
    secret: Vec<u8>,
    lifetimes: TokenLifetimes,
}

impl TokenSigner {
    pub fn new(secret: &[u8], lifetimes: TokenLifetimes) -> AccountResult<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(AccountError::Config(format!(
                "Signing secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        Ok(Self {
            secret: secret.to_vec(),
            lifetimes,
        })
    }

    pub fn lifetimes(&self) -> &TokenLifetimes {
        &self.lifetimes
    }

    // Per-purpose key: HMAC(secret, "hackboard-token:<label>")
    fn purpose_mac<P: TokenPurpose>(&self) -> AccountResult<HmacSha256> {
        let mut derive = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AccountError::Config(format!("Invalid signing secret: {}", e)))?;
        derive.update(b"hackboard-token:");
        derive.update(P::LABEL.as_bytes());
        let key = derive.finalize().into_bytes();

        HmacSha256::new_from_slice(&key)
            .map_err(|e| AccountError::Config(format!("Invalid purpose key: {}", e)))
    }

    /// Issue a token of purpose `P` for `subject`
    pub fn issue<P: TokenPurpose>(&self, subject: &str) -> AccountResult<IssuedToken<P>> {
        self.issue_at(subject, get_current_timestamp())
    }

    pub fn issue_at<P: TokenPurpose>(
        &self,
        subject: &str,
        now: u64,
    ) -> AccountResult<IssuedToken<P>> {
        let token_id = hex::encode(rand::thread_rng().gen::<[u8; 16]>());
        let claims = Claims {
            subject: subject.to_string(),
            token_id,
            issued_at: now,
            expires_at: now.saturating_add(P::lifetime(&self.lifetimes)),
        };

        let wire = WireClaims {
            pur: P::LABEL.to_string(),
            sub: claims.subject.clone(),
            jti: claims.token_id.clone(),
            iat: claims.issued_at,
            exp: claims.expires_at,
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&wire)?);

        let mut mac = self.purpose_mac::<P>()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(IssuedToken {
            token: Token::parse(format!("{}.{}", payload, signature)),
            claims,
        })
    }

    /// Verify a token of purpose `P` and return its claims
    pub fn verify<P: TokenPurpose>(&self, token: &Token<P>) -> AccountResult<Claims> {
        self.verify_at(token, get_current_timestamp())
    }

    pub fn verify_at<P: TokenPurpose>(&self, token: &Token<P>, now: u64) -> AccountResult<Claims> {
        let (payload, signature) = token
            .as_str()
            .split_once('.')
            .ok_or(AccountError::InvalidToken)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AccountError::InvalidToken)?;

        let mut mac = self.purpose_mac::<P>()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AccountError::InvalidToken)?;

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AccountError::InvalidToken)?;
        let wire: WireClaims =
            serde_json::from_slice(&raw).map_err(|_| AccountError::InvalidToken)?;

        if wire.pur != P::LABEL {
            return Err(AccountError::InvalidToken);
        }
        if now >= wire.exp {
            return Err(AccountError::ExpiredToken);
        }

        Ok(Claims {
            subject: wire.sub,
            token_id: wire.jti,
            issued_at: wire.iat,
            expires_at: wire.exp,
        })
    }
}
