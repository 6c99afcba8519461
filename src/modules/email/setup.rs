use super::manager::SecureEmailManager;
use super::smtp::{SmtpCredentials, SmtpRelay};
use crate::modules::error::{AccountError, AccountResult};
use crate::modules::utils::io::{is_valid_email, prompt, prompt_password};
use crate::modules::utils::time::get_current_timestamp;

const DEFAULT_SMTP_PORT: u16 = 587;

/// Check an SMTP host entered by an operator
pub fn validate_smtp_host(input: &str) -> Result<String, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("SMTP server cannot be empty.".to_string());
    }
    // Basic domain validation
    if !input.contains('.') || input.contains(char::is_whitespace) {
        return Err("Invalid SMTP server format. Please enter a valid domain.".to_string());
    }
    Ok(input.to_string())
}

/// Parse an SMTP port, falling back to 587 on empty input
pub fn parse_smtp_port(input: &str) -> Result<u16, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(DEFAULT_SMTP_PORT);
    }
    match input.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err("Invalid port number. Please enter a number between 1 and 65535.".to_string()),
    }
}

/// Interactively collect SMTP credentials, test them and store them in the keyring
pub fn setup_email_credentials(from_name: &str) -> AccountResult<()> {
    println!("\n=== Email Configuration Setup ===");

    let host = loop {
        let input = prompt("SMTP server address (e.g., smtp.gmail.com)")?;
        match validate_smtp_host(&input) {
            Ok(host) => break host,
            Err(msg) => println!("{}", msg),
        }
    };

    let port = loop {
        let input = prompt("SMTP port (default: 587)")?;
        match parse_smtp_port(&input) {
            Ok(port) => break port,
            Err(msg) => println!("{}", msg),
        }
    };

    let username = loop {
        let input = prompt("Sender email address")?;
        if is_valid_email(input.trim()) {
            break input.trim().to_string();
        }
        println!("Invalid email format. Please try again.");
    };

    let password = prompt_password("SMTP password or app password")?;
    if password.is_empty() {
        return Err(AccountError::MissingField("SMTP password"));
    }

    let credentials = SmtpCredentials {
        username: username.clone(),
        password: password.clone(),
        host: host.clone(),
        port,
        last_updated: get_current_timestamp(),
    };

    println!("\nTesting connection to {}:{}...", host, port);
    let relay = SmtpRelay::new(credentials, from_name)?;
    if !relay.test_connection()? {
        return Err(AccountError::Mail(
            "SMTP server did not accept the connection".to_string(),
        ));
    }

    SecureEmailManager::new()?.store_credentials(&username, &password, &host, port)?;
    log::info!("SMTP credentials stored for host {}", host);
    println!("Email configuration saved.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_host_validation() {
        assert_eq!(
            validate_smtp_host(" smtp.gmail.com ").unwrap(),
            "smtp.gmail.com"
        );
        assert!(validate_smtp_host("").is_err());
        assert!(validate_smtp_host("localhost").is_err());
        assert!(validate_smtp_host("smtp example.com").is_err());
    }

    #[test]
    fn test_smtp_port_parsing() {
        assert_eq!(parse_smtp_port("").unwrap(), 587);
        assert_eq!(parse_smtp_port("465").unwrap(), 465);
        assert!(parse_smtp_port("0").is_err());
        assert!(parse_smtp_port("70000").is_err());
        assert!(parse_smtp_port("abc").is_err());
    }
}
