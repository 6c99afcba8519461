use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::PoolConfig;
use lettre::{Message, SmtpTransport, Transport as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::mailer::Transport;
use super::templates::RenderedEmail;
use crate::modules::error::AccountResult;
use crate::modules::utils::logging::format_sensitive;

/// SMTP credentials with metadata, as kept in the system keyring
#[derive(Serialize, Deserialize, Clone)]
pub struct SmtpCredentials {
    // The email address/username for SMTP authentication
    pub username: String,
    // The password or app-specific password for SMTP
    pub password: String,
    // SMTP server hostname (e.g., smtp.gmail.com)
    pub host: String,
    // SMTP server port (typically 587 for STARTTLS)
    pub port: u16,
    // When these credentials were last updated
    pub last_updated: u64,
}

/// Delivers rendered mail through an authenticated SMTP relay
pub struct SmtpRelay {
    from: Mailbox,
    mailer: SmtpTransport,
}

impl SmtpRelay {
    /// Build a relay; `from_name` is the display name on outgoing mail
    pub fn new(creds: SmtpCredentials, from_name: &str) -> AccountResult<Self> {
        let from: Mailbox = format!("{} <{}>", from_name, creds.username).parse()?;
        let tls_parameters = TlsParameters::builder(creds.host.clone()).build()?;

        let mailer = SmtpTransport::relay(&creds.host)?
            .credentials(Credentials::new(creds.username, creds.password))
            .port(creds.port)
            .tls(Tls::Required(tls_parameters))
            .pool_config(PoolConfig::new().max_size(1))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(Self { from, mailer })
    }

    /// Send from a different address than the SMTP login, keeping the display name
    pub fn with_from_address(mut self, address: &str) -> AccountResult<Self> {
        let name = self.from.name.clone().unwrap_or_default();
        self.from = format!("{} <{}>", name, address).parse()?;
        Ok(self)
    }

    pub fn from_mailbox(&self) -> &Mailbox {
        &self.from
    }

    /// Check that the relay accepts a connection
    pub fn test_connection(&self) -> AccountResult<bool> {
        Ok(self.mailer.test_connection()?)
    }
}

/// Build the MIME message for one rendered email
pub fn build_message(from: &Mailbox, to: &str, email: &RenderedEmail) -> AccountResult<Message> {
    let to: Mailbox = to.parse()?;

    Ok(Message::builder()
        .from(from.clone())
        .to(to)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())?)
}

impl Transport for SmtpRelay {
    fn deliver(&self, to: &str, email: &RenderedEmail) -> AccountResult<()> {
        let message = build_message(&self.from, to, email)?;

        self.mailer.send(&message)?;
        log::info!("Email \"{}\" sent to {}", email.subject, format_sensitive(to));
        Ok(())
    }
}
