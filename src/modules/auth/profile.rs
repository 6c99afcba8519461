use super::store::{Profile, Submission};
use crate::modules::error::{AccountError, AccountResult};

pub const MAX_NAME_LENGTH: usize = 80;
pub const MAX_TEAM_CODE_LENGTH: usize = 32;
pub const MAX_FIELD_LENGTH: usize = 120;

// Blank optional fields are stored as absent
fn optional_field(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Check a submitted profile and return it trimmed
pub fn validate_profile(profile: &Profile) -> AccountResult<Profile> {
    let name = profile.name.trim();
    if name.is_empty() {
        return Err(AccountError::MissingField("Name"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AccountError::InvalidProfile(format!(
            "name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }

    let team_code = optional_field(&profile.team_code);
    if let Some(code) = &team_code {
        if code.len() > MAX_TEAM_CODE_LENGTH {
            return Err(AccountError::InvalidProfile(format!(
                "team code must be at most {} characters",
                MAX_TEAM_CODE_LENGTH
            )));
        }
        if !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AccountError::InvalidProfile(
                "team code may only contain letters, digits, '-' and '_'".to_string(),
            ));
        }
    }

    let affiliation = optional_field(&profile.affiliation);
    let github = optional_field(&profile.github);
    for (label, value) in [("affiliation", &affiliation), ("github", &github)] {
        if value
            .as_deref()
            .is_some_and(|v| v.chars().count() > MAX_FIELD_LENGTH)
        {
            return Err(AccountError::InvalidProfile(format!(
                "{} must be at most {} characters",
                label, MAX_FIELD_LENGTH
            )));
        }
    }

    Ok(Profile {
        name: name.to_string(),
        team_code,
        affiliation,
        github,
    })
}

/// Check a submission and return it trimmed
pub fn validate_submission(submission: &Submission) -> AccountResult<Submission> {
    let code = submission.code.trim();
    let title = submission.title.trim();
    if code.is_empty() {
        return Err(AccountError::MissingField("Submission code"));
    }
    if title.is_empty() {
        return Err(AccountError::MissingField("Submission title"));
    }
    if title.chars().count() > MAX_FIELD_LENGTH {
        return Err(AccountError::InvalidSubmission(format!(
            "title must be at most {} characters",
            MAX_FIELD_LENGTH
        )));
    }

    Ok(Submission {
        code: code.to_string(),
        title: title.to_string(),
    })
}
