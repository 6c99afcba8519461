use crate::modules::utils::time::format_duration;

/// A rendered email ready for a transport
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// Body for the email-verification message
pub fn verification_email(app_url: &str, token: &str, lifetime_secs: u64) -> RenderedEmail {
    let body = format!(
        "Welcome to Hackboard!\n\
        \n\
        Please verify your email address by opening the link below:\n\
        \n\
        {}/verify?token={}\n\
        \n\
        Or paste this code into the app:\n\
        \n\
        {}\n\
        \n\
        This link will expire in {}.\n\
        \n\
        Best regards,\n\
        The Hackboard Team",
        app_url.trim_end_matches('/'),
        token,
        token,
        format_duration(lifetime_secs)
    );

    RenderedEmail {
        subject: "Welcome to Hackboard - Verify Your Email".to_string(),
        body,
    }
}

/// Body for the password-reset message
pub fn password_reset_email(app_url: &str, token: &str, lifetime_secs: u64) -> RenderedEmail {
    let body = format!(
        "Hello,\n\n\
        A password reset was requested for your Hackboard account.\n\n\
        To choose a new password, open the link below:\n\n\
        {}/reset-password?token={}\n\n\
        This link can be used once and will expire in {}.\n\n\
        If you did not request this reset, please ignore this email; \
        your password will not change.\n\n\
        Best regards,\n\
        The Hackboard Team",
        app_url.trim_end_matches('/'),
        token,
        format_duration(lifetime_secs)
    );

    RenderedEmail {
        subject: "Password Reset Request - Hackboard".to_string(),
        body,
    }
}

/// Body for the notice sent after a password change
pub fn password_changed_email() -> RenderedEmail {
    let body = "Hello,\n\n\
        The password for your Hackboard account was just changed, and every \
        active session has been signed out.\n\n\
        If you did not make this change, reset your password immediately.\n\n\
        Best regards,\n\
        The Hackboard Team"
        .to_string();

    RenderedEmail {
        subject: "Your Hackboard password was changed".to_string(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_email_contains_link_and_code() {
        let email = verification_email("https://hack.example.com/", "abc.def", 86400);

        assert!(email
            .body
            .contains("https://hack.example.com/verify?token=abc.def"));
        assert!(email.body.contains("expire in 1 day"));

        // The bare code sits on its own line for easy copying
        let lines: Vec<&str> = email.body.lines().collect();
        let idx = lines.iter().position(|&l| l == "abc.def").unwrap();
        assert_eq!(lines[idx - 1], "");
        assert_eq!(lines[idx + 1], "");
    }

    #[test]
    fn test_reset_email_security_content() {
        let email = password_reset_email("https://hack.example.com", "r.t", 1800);

        assert!(email.subject.contains("Password Reset"));
        assert!(email.body.contains("/reset-password?token=r.t"));
        assert!(
            email.body.contains("expire in 30 minutes"),
            "Email should mention expiration time"
        );
        assert!(
            email.body.contains("used once"),
            "Email should state the link is single-use"
        );
        assert!(
            email.body.contains("did not request this reset"),
            "Email should address case of unrequested resets"
        );
    }

    #[test]
    fn test_password_changed_email() {
        let email = password_changed_email();
        assert!(email.body.contains("was just changed"));
        assert!(email.body.contains("signed out"));
    }
}
