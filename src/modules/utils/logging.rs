use env_logger::{Builder, Target, WriteStyle};
use log::{error, info, warn, LevelFilter};
use std::fs::OpenOptions;
use std::path::Path;
use std::str::FromStr;

/// Initialize the logging system.
///
/// Logs go to stderr unless a log file is given, in which case they are
/// appended to it. `HACKBOARD_LOG` overrides the configured level.
pub fn initialize_logging(
    level: &str,
    log_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let level = std::env::var("HACKBOARD_LOG").unwrap_or_else(|_| level.to_string());
    let filter = LevelFilter::from_str(&level).unwrap_or(LevelFilter::Info);

    let mut builder = Builder::new();
    builder
        .filter_level(filter)
        .format_timestamp_secs()
        .format_module_path(true)
        .write_style(WriteStyle::Auto);

    if let Some(path) = log_file {
        // Create or append to the log file
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder.try_init()?;

    info!("Logging system initialized at level {}", filter);
    Ok(())
}

/// Mask an identifier so logs never carry a full email address
pub fn format_sensitive(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

/// Structured logging for authentication events
pub fn log_auth_event(event_type: &str, user: &str, success: bool, details: Option<&str>) {
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    if success {
        info!(
            "Auth event: type={}, user={}, success=true, timestamp={}, details={:?}",
            event_type,
            format_sensitive(user),
            timestamp,
            details
        );
    } else {
        warn!(
            "Auth event: type={}, user={}, success=false, timestamp={}, details={:?}",
            event_type,
            format_sensitive(user),
            timestamp,
            details
        );
    }
}

/// Structured logging for store operations
pub fn log_data_operation(
    operation: &str,
    user: &str,
    resource: &str,
    success: bool,
    details: Option<&str>,
) {
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    if success {
        info!(
            "Data operation: op={}, user={}, resource={}, success=true, timestamp={}, details={:?}",
            operation,
            format_sensitive(user),
            resource,
            timestamp,
            details
        );
    } else {
        error!(
            "Data operation: op={}, user={}, resource={}, success=false, timestamp={}, details={:?}",
            operation,
            format_sensitive(user),
            resource,
            timestamp,
            details
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sensitive_data_formatting() {
        assert_eq!(format_sensitive("password"), "pa***rd");
        assert_eq!(format_sensitive("key"), "***");
        assert_eq!(format_sensitive("alice@example.com"), "al***om");
        assert_eq!(format_sensitive(""), "");
        // Multi-byte characters must not split
        assert_eq!(format_sensitive("éèêëē"), "éè***ëē");
    }

    #[test]
    fn test_logging_initialization() {
        let log_file = NamedTempFile::new().unwrap();

        let result = initialize_logging("debug", Some(log_file.path()));

        // Another test may have installed the global logger first
        assert!(
            result.is_ok()
                || result
                    .unwrap_err()
                    .to_string()
                    .contains("already")
        );
    }
}
