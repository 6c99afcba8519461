use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::password::PasswordHash;
use crate::modules::error::AccountResult;
use crate::modules::utils::time::get_current_timestamp;

/// Public profile details a user fills in after verifying their email
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
}

/// The single project submission a user may hold
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Submission {
    pub code: String,
    pub title: String,
}

/// Most sessions kept per user; the oldest are dropped beyond this
pub const MAX_ACTIVE_SESSIONS: usize = 20;

/// A live login session, identified by its token id
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActiveSession {
    pub id: String,
    pub expires_at: u64,
}

impl ActiveSession {
    pub fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// A stored user record, including credentials and token bookkeeping
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String, // Always lowercase
    pub password: PasswordHash,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub profile_complete: bool,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub submission: Option<Submission>,
    #[serde(default)]
    pub sessions: Vec<ActiveSession>,
    #[serde(default)]
    pub reset_token_id: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl User {
    /// Build a fresh, unverified user with a random 24-hex-character id
    pub fn new(email: String, password: PasswordHash) -> Self {
        let now = get_current_timestamp();
        Self {
            id: hex::encode(rand::thread_rng().gen::<[u8; 12]>()),
            email,
            password,
            profile: Profile::default(),
            profile_complete: false,
            verified: false,
            submission: None,
            sessions: Vec::new(),
            reset_token_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_session(&self, token_id: &str, now: u64) -> bool {
        self.sessions
            .iter()
            .any(|session| session.id == token_id && session.is_live(now))
    }

    /// Record a new session, dropping expired ones and the oldest beyond the cap
    pub fn add_session(&mut self, session: ActiveSession, now: u64) {
        self.sessions.retain(|existing| existing.is_live(now));
        self.sessions.push(session);
        if self.sessions.len() > MAX_ACTIVE_SESSIONS {
            let excess = self.sessions.len() - MAX_ACTIVE_SESSIONS;
            self.sessions.drain(..excess);
        }
    }

    /// Listing order: profile name, then email
    pub fn listing_order(a: &User, b: &User) -> Ordering {
        a.profile
            .name
            .cmp(&b.profile.name)
            .then_with(|| a.email.cmp(&b.email))
    }
}

/// A user record with credentials and token state stripped
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub profile: Profile,
    pub profile_complete: bool,
    pub verified: bool,
    pub submission: Option<Submission>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            profile: user.profile.clone(),
            profile_complete: user.profile_complete,
            verified: user.verified,
            submission: user.submission.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        PublicUser::from(&user)
    }
}

/// Filter over stored users. Unset fields match everything; set fields are ANDed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserQuery {
    pub id: Option<String>,
    pub email: Option<String>,
    pub verified: Option<bool>,
    /// Case-insensitive substring over email, profile name or team code
    pub search: Option<String>,
    /// Matches only while this reset token id is still pending
    pub reset_token_id: Option<String>,
}

impl UserQuery {
    pub fn by_id(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn by_email(email: &str) -> Self {
        Self {
            email: Some(email.to_lowercase()),
            ..Self::default()
        }
    }

    pub fn verified(mut self) -> Self {
        self.verified = Some(true);
        self
    }

    pub fn with_pending_reset(mut self, token_id: &str) -> Self {
        self.reset_token_id = Some(token_id.to_string());
        self
    }

    pub fn search(text: &str) -> Self {
        let text = text.trim();
        Self {
            search: (!text.is_empty()).then(|| text.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        if let Some(id) = &self.id {
            if &user.id != id {
                return false;
            }
        }
        if let Some(email) = &self.email {
            if !user.email.eq_ignore_ascii_case(email) {
                return false;
            }
        }
        if let Some(verified) = self.verified {
            if user.verified != verified {
                return false;
            }
        }
        if let Some(pending) = &self.reset_token_id {
            if user.reset_token_id.as_ref() != Some(pending) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = user.email.to_lowercase().contains(&needle)
                || user.profile.name.to_lowercase().contains(&needle)
                || user
                    .profile
                    .team_code
                    .as_deref()
                    .is_some_and(|code| code.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Field assignments applied by `find_one_and_update`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserUpdate {
    pub password: Option<PasswordHash>,
    pub profile: Option<Profile>,
    pub profile_complete: Option<bool>,
    pub verified: Option<bool>,
    pub submission: Option<Submission>,
    pub push_session: Option<ActiveSession>,
    pub pull_session_id: Option<String>,
    pub clear_sessions: bool,
    /// `Some(None)` clears the pending reset token
    pub reset_token_id: Option<Option<String>>,
    pub touch: bool,
}

impl UserUpdate {
    pub fn apply(&self, user: &mut User) {
        if let Some(password) = &self.password {
            user.password = password.clone();
        }
        if let Some(profile) = &self.profile {
            user.profile = profile.clone();
        }
        if let Some(complete) = self.profile_complete {
            user.profile_complete = complete;
        }
        if let Some(verified) = self.verified {
            user.verified = verified;
        }
        if let Some(submission) = &self.submission {
            user.submission = Some(submission.clone());
        }
        if self.clear_sessions {
            user.sessions.clear();
        }
        if let Some(session_id) = &self.pull_session_id {
            user.sessions.retain(|session| &session.id != session_id);
        }
        if let Some(session) = &self.push_session {
            user.add_session(session.clone(), get_current_timestamp());
        }
        if let Some(reset) = &self.reset_token_id {
            user.reset_token_id = reset.clone();
        }
        if self.touch {
            user.updated_at = get_current_timestamp();
        }
    }
}

/// Persistence collaborator for user records.
///
/// Implementations guard their own state, so every method takes `&self`.
/// `save` must reject a record whose email belongs to a different user,
/// checking and inserting atomically.
pub trait CredentialStore {
    fn find_one_by_email(&self, email: &str) -> AccountResult<Option<User>>;

    fn find_by_id(&self, id: &str) -> AccountResult<Option<User>>;

    /// Matching users in listing order, skipping `skip` and returning at most `limit`
    fn find(&self, query: &UserQuery, skip: usize, limit: usize) -> AccountResult<Vec<User>>;

    fn count(&self, query: &UserQuery) -> AccountResult<u64>;

    /// One page of matches plus the total match count, read from the same snapshot
    fn find_page(
        &self,
        query: &UserQuery,
        skip: usize,
        limit: usize,
    ) -> AccountResult<(Vec<User>, u64)>;

    /// Apply `update` to the first user matching `filter` and return the updated record
    fn find_one_and_update(
        &self,
        filter: &UserQuery,
        update: &UserUpdate,
    ) -> AccountResult<Option<User>>;

    /// Insert a new user or replace an existing one with the same id
    fn save(&self, user: &User) -> AccountResult<User>;
}
