pub mod mailer;
pub mod manager;
mod setup;
mod smtp;
mod templates;

pub use mailer::{
    LogMailer, LogTransport, MailContext, Mailer, RecordingMailer, RecordingTransport, SentEmail,
    TemplateMailer, Transport,
};
pub use manager::SecureEmailManager;
pub use setup::{parse_smtp_port, setup_email_credentials, validate_smtp_host};
pub use smtp::{build_message, SmtpCredentials, SmtpRelay};
pub use templates::{password_changed_email, password_reset_email, verification_email, RenderedEmail};

/// Mailer that delivers through an authenticated SMTP relay
pub type SmtpMailer = TemplateMailer<SmtpRelay>;
