use std::sync::Mutex;

use super::templates::{
    password_changed_email, password_reset_email, verification_email, RenderedEmail,
};
use crate::modules::error::{AccountError, AccountResult};
use crate::modules::utils::logging::format_sensitive;

/// Outgoing account mail.
///
/// Tokens arrive as plain strings; the mailer only formats and delivers them.
pub trait Mailer {
    fn send_verification_email(&self, email: &str, token: &str) -> AccountResult<()>;

    fn send_password_reset_email(&self, email: &str, token: &str) -> AccountResult<()>;

    fn send_password_changed_email(&self, email: &str) -> AccountResult<()>;
}

impl<M: Mailer + ?Sized> Mailer for Box<M> {
    fn send_verification_email(&self, email: &str, token: &str) -> AccountResult<()> {
        (**self).send_verification_email(email, token)
    }

    fn send_password_reset_email(&self, email: &str, token: &str) -> AccountResult<()> {
        (**self).send_password_reset_email(email, token)
    }

    fn send_password_changed_email(&self, email: &str) -> AccountResult<()> {
        (**self).send_password_changed_email(email)
    }
}

/// Link and expiry details shared by every template
#[derive(Debug, Clone)]
pub struct MailContext {
    pub app_url: String,
    pub verification_lifetime_secs: u64,
    pub reset_lifetime_secs: u64,
}

impl MailContext {
    pub fn verification(&self, token: &str) -> RenderedEmail {
        verification_email(&self.app_url, token, self.verification_lifetime_secs)
    }

    pub fn password_reset(&self, token: &str) -> RenderedEmail {
        password_reset_email(&self.app_url, token, self.reset_lifetime_secs)
    }

    pub fn password_changed(&self) -> RenderedEmail {
        password_changed_email()
    }
}

/// Anything that can deliver one rendered message
pub trait Transport {
    fn deliver(&self, to: &str, email: &RenderedEmail) -> AccountResult<()>;
}

/// Renders templates and hands them to a transport
pub struct TemplateMailer<T> {
    context: MailContext,
    transport: T,
}

impl<T: Transport> TemplateMailer<T> {
    pub fn new(context: MailContext, transport: T) -> Self {
        Self { context, transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> Mailer for TemplateMailer<T> {
    fn send_verification_email(&self, email: &str, token: &str) -> AccountResult<()> {
        self.transport.deliver(email, &self.context.verification(token))
    }

    fn send_password_reset_email(&self, email: &str, token: &str) -> AccountResult<()> {
        self.transport
            .deliver(email, &self.context.password_reset(token))
    }

    fn send_password_changed_email(&self, email: &str) -> AccountResult<()> {
        self.transport.deliver(email, &self.context.password_changed())
    }
}

/// Transport that only writes to the log. Used when SMTP is not configured.
#[derive(Debug, Default)]
pub struct LogTransport;

impl Transport for LogTransport {
    fn deliver(&self, to: &str, email: &RenderedEmail) -> AccountResult<()> {
        log::info!(
            "Mail delivery disabled; would send \"{}\" to {}",
            email.subject,
            format_sensitive(to)
        );
        log::debug!("Undelivered body:\n{}", email.body);
        Ok(())
    }
}

/// One captured message
#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Transport that keeps every message in memory
#[derive(Debug, Default)]
pub struct RecordingTransport {
    outbox: Mutex<Vec<SentEmail>>,
    fail_with: Mutex<Option<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following delivery fail with `reason`
    pub fn fail_next_deliveries(&self, reason: &str) {
        if let Ok(mut fail) = self.fail_with.lock() {
            *fail = Some(reason.to_string());
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, to: &str) -> Vec<SentEmail> {
        self.sent().into_iter().filter(|m| m.to == to).collect()
    }
}

impl Transport for RecordingTransport {
    fn deliver(&self, to: &str, email: &RenderedEmail) -> AccountResult<()> {
        if let Some(reason) = self
            .fail_with
            .lock()
            .map_err(|_| AccountError::Mail("outbox lock poisoned".to_string()))?
            .clone()
        {
            return Err(AccountError::Mail(reason));
        }

        self.outbox
            .lock()
            .map_err(|_| AccountError::Mail("outbox lock poisoned".to_string()))?
            .push(SentEmail {
                to: to.to_string(),
                subject: email.subject.clone(),
                body: email.body.clone(),
            });
        Ok(())
    }
}

pub type LogMailer = TemplateMailer<LogTransport>;
pub type RecordingMailer = TemplateMailer<RecordingTransport>;

impl RecordingMailer {
    pub fn recording(context: MailContext) -> Self {
        TemplateMailer::new(context, RecordingTransport::new())
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.transport().sent()
    }
}
