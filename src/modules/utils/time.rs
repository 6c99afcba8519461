use chrono::Utc;

/// Current unix timestamp in seconds
pub fn get_current_timestamp() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Format a duration in seconds the way it appears in outgoing mail
pub fn format_duration(seconds: u64) -> String {
    fn plural(n: u64, unit: &str) -> String {
        if n == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", n, unit)
        }
    }

    if seconds < 60 {
        plural(seconds, "second")
    } else if seconds < 3600 {
        plural(seconds / 60, "minute")
    } else if seconds < 86400 {
        plural(seconds / 3600, "hour")
    } else {
        plural(seconds / 86400, "day")
    }
}
