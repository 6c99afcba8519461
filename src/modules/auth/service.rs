use serde::{Deserialize, Serialize};

use super::password::{hash_password_with_rounds, validate_password, verify_password, PBKDF2_ROUNDS};
use super::profile::{validate_profile, validate_submission};
use super::store::{
    ActiveSession, CredentialStore, Profile, PublicUser, Submission, User, UserQuery, UserUpdate,
};
use super::tokens::{
    Claims, EmailVerification, PasswordReset, ResetToken, Session, SessionToken, TokenSigner,
    VerificationToken,
};
use crate::modules::email::Mailer;
use crate::modules::error::{AccountError, AccountResult};
use crate::modules::utils::io::{is_valid_email, normalize_email};
use crate::modules::utils::logging::{log_auth_event, log_data_operation};
use crate::modules::utils::time::get_current_timestamp;
use crate::MAX_PAGE_SIZE;

/// Returned for every reset request so callers cannot tell whether the account exists
pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent";
pub const RESEND_REQUESTED_MESSAGE: &str =
    "If an unverified account exists for that email, a new verification link has been sent";
pub const PASSWORD_RESET_MESSAGE: &str = "Your password has been reset. Please log in again";

/// Session token plus the sanitized user, returned by register and login
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthResponse {
    pub token: SessionToken,
    pub user: PublicUser,
}

/// One page request over the user listing. Pages are 0-based.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub page: usize,
    pub page_size: usize,
    #[serde(default)]
    pub search: Option<String>,
}

impl ListQuery {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page,
            page_size,
            search: None,
        }
    }

    pub fn with_search(mut self, search: &str) -> Self {
        self.search = Some(search.to_string());
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserPage {
    pub users: Vec<PublicUser>,
    pub page: usize,
    pub page_size: usize,
    pub total: u64,
    pub total_pages: u64,
}

fn active_session(claims: &Claims) -> ActiveSession {
    ActiveSession {
        id: claims.token_id.clone(),
        expires_at: claims.expires_at,
    }
}

/// The user workflow: validation, store orchestration, tokens and mail
pub struct AccountService<S, M> {
    store: S,
    mailer: M,
    signer: TokenSigner,
    password_rounds: u32,
    max_page_size: usize,
}

impl<S: CredentialStore, M: Mailer> AccountService<S, M> {
    pub fn new(store: S, mailer: M, signer: TokenSigner) -> Self {
        Self {
            store,
            mailer,
            signer,
            password_rounds: PBKDF2_ROUNDS,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    /// PBKDF2 iterations for newly hashed passwords
    pub fn with_password_rounds(mut self, rounds: u32) -> Self {
        self.password_rounds = rounds.max(1);
        self
    }

    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn mailer(&self) -> &M {
        &self.mailer
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    // Present, well-formed and normalized
    fn checked_email(email: &str) -> AccountResult<String> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AccountError::MissingField("Email"));
        }
        if !is_valid_email(&email) {
            return Err(AccountError::InvalidEmail);
        }
        Ok(email)
    }

    fn send_verification(&self, email: &str) -> AccountResult<()> {
        let verification = self.signer.issue::<EmailVerification>(email)?;
        self.mailer
            .send_verification_email(email, verification.token.as_str())
    }

    /// Create an account and sign it in
    pub fn register(&self, email: &str, password: &str) -> AccountResult<AuthResponse> {
        validate_password(password)?;
        let email = Self::checked_email(email)?;

        if self.store.find_one_by_email(&email)?.is_some() {
            log_auth_event("register", &email, false, Some("email already registered"));
            return Err(AccountError::EmailTaken);
        }

        let mut user = User::new(email, hash_password_with_rounds(password, self.password_rounds));
        let session = self.signer.issue::<Session>(&user.id)?;
        user.add_session(active_session(&session.claims), session.claims.issued_at);

        // The store re-checks the email under its lock
        let user = self.store.save(&user).map_err(|e| {
            log_auth_event("register", &user.email, false, Some(&e.message()));
            e
        })?;

        if let Err(e) = self.send_verification(&user.email) {
            log::warn!("Verification email not sent after registration: {}", e);
        }

        log_auth_event("register", &user.email, true, None);
        Ok(AuthResponse {
            token: session.token,
            user: PublicUser::from(user),
        })
    }

    /// Exchange credentials for a new session token
    pub fn login(&self, email: &str, password: &str) -> AccountResult<AuthResponse> {
        if password.is_empty() {
            return Err(AccountError::MissingField("Password"));
        }
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AccountError::InvalidEmail);
        }

        let user = match self.store.find_one_by_email(&email)? {
            Some(user) => user,
            None => {
                log_auth_event("login", &email, false, Some("unknown email"));
                return Err(AccountError::InvalidCredentials);
            }
        };

        if !verify_password(password, &user.password)? {
            log_auth_event("login", &email, false, Some("wrong password"));
            return Err(AccountError::InvalidCredentials);
        }

        let session = self.signer.issue::<Session>(&user.id)?;
        let update = UserUpdate {
            push_session: Some(active_session(&session.claims)),
            ..UserUpdate::default()
        };
        let user = self
            .store
            .find_one_and_update(&UserQuery::by_id(&user.id), &update)?
            .ok_or(AccountError::UserNotFound)?;

        log_auth_event("login", &email, true, None);
        Ok(AuthResponse {
            token: session.token,
            user: PublicUser::from(user),
        })
    }

    /// Resolve a session token to its user. No new token is issued.
    pub fn login_with_token(&self, token: &SessionToken) -> AccountResult<PublicUser> {
        if token.is_empty() {
            return Err(AccountError::MissingField("Token"));
        }
        let claims = self.signer.verify(token)?;

        let user = self
            .store
            .find_by_id(&claims.subject)?
            .ok_or(AccountError::UserNotFound)?;

        if !user.has_session(&claims.token_id, get_current_timestamp()) {
            log_auth_event("token_login", &user.email, false, Some("session revoked"));
            return Err(AccountError::InvalidToken);
        }

        log_auth_event("token_login", &user.email, true, None);
        Ok(PublicUser::from(user))
    }

    /// Revoke one session
    pub fn logout(&self, token: &SessionToken) -> AccountResult<()> {
        if token.is_empty() {
            return Err(AccountError::MissingField("Token"));
        }
        let claims = self.signer.verify(token)?;

        let update = UserUpdate {
            pull_session_id: Some(claims.token_id),
            ..UserUpdate::default()
        };
        let user = self
            .store
            .find_one_and_update(&UserQuery::by_id(&claims.subject), &update)?
            .ok_or(AccountError::UserNotFound)?;

        log_auth_event("logout", &user.email, true, None);
        Ok(())
    }

    /// Mark the account the token was issued for as verified
    pub fn verify_email(&self, token: &VerificationToken) -> AccountResult<PublicUser> {
        if token.is_empty() {
            return Err(AccountError::MissingField("Token"));
        }
        let claims = self.signer.verify(token)?;

        let update = UserUpdate {
            verified: Some(true),
            touch: true,
            ..UserUpdate::default()
        };
        let user = self
            .store
            .find_one_and_update(&UserQuery::by_email(&claims.subject), &update)?
            .ok_or_else(|| {
                log_auth_event("verify_email", &claims.subject, false, Some("no matching account"));
                AccountError::UserNotFound
            })?;

        log_auth_event("verify_email", &user.email, true, None);
        Ok(PublicUser::from(user))
    }

    /// Send a fresh verification link to an unverified account
    pub fn resend_verification(&self, email: &str) -> AccountResult<String> {
        let email = Self::checked_email(email)?;

        match self.store.find_one_by_email(&email)? {
            Some(user) if !user.verified => match self.send_verification(&user.email) {
                Ok(()) => log_auth_event("resend_verification", &email, true, None),
                // Same answer as an unknown email
                Err(e) => log_auth_event("resend_verification", &email, false, Some(&e.message())),
            },
            Some(_) => {
                log_auth_event("resend_verification", &email, false, Some("already verified"));
            }
            None => {
                log_auth_event("resend_verification", &email, false, Some("unknown email"));
            }
        }
        Ok(RESEND_REQUESTED_MESSAGE.to_string())
    }

    /// Issue a single-use reset token and mail it. Unknown emails get the same answer.
    pub fn request_password_reset(&self, email: &str) -> AccountResult<String> {
        let email = Self::checked_email(email)?;

        let user = match self.store.find_one_by_email(&email)? {
            Some(user) => user,
            None => {
                log::warn!("Password reset requested for an unknown account");
                log_auth_event("reset_request", &email, false, Some("unknown email"));
                return Ok(RESET_REQUESTED_MESSAGE.to_string());
            }
        };

        let reset = self.signer.issue::<PasswordReset>(&user.id)?;
        // Replaces any earlier pending reset
        let update = UserUpdate {
            reset_token_id: Some(Some(reset.claims.token_id.clone())),
            touch: true,
            ..UserUpdate::default()
        };
        self.store
            .find_one_and_update(&UserQuery::by_id(&user.id), &update)?
            .ok_or(AccountError::UserNotFound)?;

        // A failed send keeps the reset pending and answers like any other request
        match self
            .mailer
            .send_password_reset_email(&user.email, reset.token.as_str())
        {
            Ok(()) => log_auth_event("reset_request", &email, true, None),
            Err(e) => log_auth_event("reset_request", &email, false, Some(&e.message())),
        }
        Ok(RESET_REQUESTED_MESSAGE.to_string())
    }

    /// Set a new password with a pending reset token, signing out every session
    pub fn complete_password_reset(
        &self,
        token: &ResetToken,
        new_password: &str,
    ) -> AccountResult<String> {
        if token.is_empty() {
            return Err(AccountError::MissingField("Token"));
        }
        validate_password(new_password)?;

        let claims = self.signer.verify(token)?;
        let update = UserUpdate {
            password: Some(hash_password_with_rounds(new_password, self.password_rounds)),
            reset_token_id: Some(None),
            clear_sessions: true,
            touch: true,
            ..UserUpdate::default()
        };

        // Matching on the pending id consumes the token in the same store write
        let filter = UserQuery::by_id(&claims.subject).with_pending_reset(&claims.token_id);
        let user = self
            .store
            .find_one_and_update(&filter, &update)?
            .ok_or_else(|| {
                log_auth_event("reset_complete", &claims.subject, false, Some("token not pending"));
                AccountError::InvalidToken
            })?;

        if let Err(e) = self.mailer.send_password_changed_email(&user.email) {
            log::warn!("Password-changed notice not sent: {}", e);
        }

        log_auth_event("reset_complete", &user.email, true, None);
        Ok(PASSWORD_RESET_MESSAGE.to_string())
    }

    /// Save profile details for a verified user
    pub fn update_profile(&self, user_id: &str, profile: &Profile) -> AccountResult<PublicUser> {
        let profile = validate_profile(profile)?;

        let update = UserUpdate {
            profile: Some(profile),
            profile_complete: Some(true),
            touch: true,
            ..UserUpdate::default()
        };
        let user = self
            .store
            .find_one_and_update(&UserQuery::by_id(user_id).verified(), &update)?
            .ok_or_else(|| {
                log_data_operation("update_profile", user_id, "profile", false, Some("no verified match"));
                AccountError::NotVerified
            })?;

        log_data_operation("update_profile", &user.email, "profile", true, None);
        Ok(PublicUser::from(user))
    }

    /// Overwrite the user's submission; the last write wins
    pub fn update_submission(
        &self,
        user_id: &str,
        submission: &Submission,
    ) -> AccountResult<PublicUser> {
        let submission = validate_submission(submission)?;

        let update = UserUpdate {
            submission: Some(submission),
            touch: true,
            ..UserUpdate::default()
        };
        let user = self
            .store
            .find_one_and_update(&UserQuery::by_id(user_id), &update)?
            .ok_or(AccountError::UserNotFound)?;

        log_data_operation("update_submission", &user.email, "submission", true, None);
        Ok(PublicUser::from(user))
    }

    pub fn get_user(&self, user_id: &str) -> AccountResult<PublicUser> {
        self.store
            .find_by_id(user_id)?
            .map(PublicUser::from)
            .ok_or(AccountError::UserNotFound)
    }

    /// One page of users sorted by name, optionally filtered by a search term
    pub fn list_users(&self, query: &ListQuery) -> AccountResult<UserPage> {
        if query.page_size == 0 || query.page_size > self.max_page_size {
            return Err(AccountError::InvalidPage(format!(
                "page size must be between 1 and {}",
                self.max_page_size
            )));
        }
        let skip = query
            .page
            .checked_mul(query.page_size)
            .ok_or_else(|| AccountError::InvalidPage("page is out of range".to_string()))?;

        let filter = UserQuery::search(query.search.as_deref().unwrap_or_default());
        let (users, total) = self.store.find_page(&filter, skip, query.page_size)?;
        let users = users.into_iter().map(PublicUser::from).collect();

        Ok(UserPage {
            users,
            page: query.page,
            page_size: query.page_size,
            total,
            total_pages: total.div_ceil(query.page_size as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::auth::file_store::JsonFileStore;
    use crate::modules::auth::memory::MemoryStore;
    use crate::modules::auth::store::MAX_ACTIVE_SESSIONS;
    use crate::modules::auth::tokens::TokenLifetimes;
    use crate::modules::email::{MailContext, RecordingMailer, SentEmail};
    use tempfile::TempDir;

    const SECRET: &[u8] = b"test-signing-secret-0123456789ab";

    type TestService = AccountService<MemoryStore, RecordingMailer>;

    fn service_with<S: CredentialStore>(store: S) -> AccountService<S, RecordingMailer> {
        let lifetimes = TokenLifetimes::default();
        let mailer = RecordingMailer::recording(MailContext {
            app_url: "https://hack.example.com".to_string(),
            verification_lifetime_secs: lifetimes.verification_secs,
            reset_lifetime_secs: lifetimes.reset_secs,
        });
        let signer = TokenSigner::new(SECRET, lifetimes).unwrap();
        AccountService::new(store, mailer, signer).with_password_rounds(1_000)
    }

    fn new_service() -> TestService {
        service_with(MemoryStore::new())
    }

    // Pull the token out of the "?token=" link in a mail body
    fn token_in(mail: &SentEmail) -> String {
        let start = mail.body.find("token=").unwrap() + "token=".len();
        mail.body[start..]
            .split_whitespace()
            .next()
            .unwrap()
            .to_string()
    }

    fn last_mail_to(service: &TestService, to: &str) -> SentEmail {
        service.mailer().transport().sent_to(to).pop().unwrap()
    }

    fn verified_user(service: &TestService, email: &str) -> PublicUser {
        service.register(email, "secret").unwrap();
        verified_user_from_mail(service, email)
    }

    #[test]
    fn test_register_returns_session_and_sanitized_user() {
        let service = new_service();
        let response = service.register("  Alice@Example.COM ", "secret").unwrap();

        assert_eq!(response.user.email, "alice@example.com");
        assert!(!response.user.verified);
        assert_eq!(
            service.login_with_token(&response.token).unwrap().id,
            response.user.id
        );

        let json = serde_json::to_value(&response).unwrap();
        assert!(json["user"].get("password").is_none());

        let mail = service.mailer().sent();
        assert_eq!(mail.len(), 1);
        assert_eq!(mail[0].to, "alice@example.com");
        assert!(mail[0].body.contains("https://hack.example.com/verify?token="));
    }

    #[test]
    fn test_register_short_password_fails_before_store_write() {
        let service = new_service();

        assert!(matches!(
            service.register("alice@example.com", "12345"),
            Err(AccountError::PasswordTooShort)
        ));
        assert!(matches!(
            service.register("alice@example.com", ""),
            Err(AccountError::MissingField("Password"))
        ));
        assert!(service.store().is_empty());
        assert!(service.mailer().sent().is_empty());
    }

    #[test]
    fn test_register_rejects_bad_email() {
        let service = new_service();
        assert!(matches!(
            service.register("   ", "secret"),
            Err(AccountError::MissingField("Email"))
        ));
        assert!(matches!(
            service.register("not-an-email", "secret"),
            Err(AccountError::InvalidEmail)
        ));
        assert!(service.store().is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_case_insensitive() {
        let service = new_service();
        service.register("alice@example.com", "secret").unwrap();

        let err = service.register("ALICE@example.com", "another").unwrap_err();
        assert!(matches!(err, AccountError::EmailTaken));
        assert!(err.message().contains("already exists"));
        assert_eq!(service.store().len(), 1);
    }

    #[test]
    fn test_registration_survives_mail_failure() {
        let service = new_service();
        service
            .mailer()
            .transport()
            .fail_next_deliveries("relay down");

        let response = service.register("alice@example.com", "secret").unwrap();
        assert_eq!(service.get_user(&response.user.id).unwrap().email, "alice@example.com");
        assert!(service.mailer().sent().is_empty());
    }

    #[test]
    fn test_login() {
        let service = new_service();
        let registered = service.register("alice@example.com", "secret").unwrap();

        let response = service.login("Alice@Example.com", "secret").unwrap();
        assert_eq!(response.user.id, registered.user.id);
        let claims = service.signer().verify(&response.token).unwrap();
        assert_eq!(claims.subject, registered.user.id);

        // Both sessions stay active
        assert!(service.login_with_token(&registered.token).is_ok());
        assert!(service.login_with_token(&response.token).is_ok());
    }

    #[test]
    fn test_login_failures() {
        let service = new_service();
        service.register("alice@example.com", "secret").unwrap();

        let wrong = service.login("alice@example.com", "secret!").unwrap_err();
        let unknown = service.login("bob@example.com", "secret").unwrap_err();
        assert!(matches!(wrong, AccountError::InvalidCredentials));
        assert_eq!(wrong.message(), unknown.message());
        assert_eq!(wrong.message(), "Invalid email or password");

        assert_eq!(
            service.login("alice@example.com", "").unwrap_err().message(),
            "Password is required"
        );
        assert_eq!(
            service.login("alice", "secret").unwrap_err().message(),
            "Invalid email address"
        );
    }

    #[test]
    fn test_login_with_token_rejects_other_purposes() {
        let service = new_service();
        let response = service.register("alice@example.com", "secret").unwrap();
        let verification = token_in(&last_mail_to(&service, "alice@example.com"));

        service.request_password_reset("alice@example.com").unwrap();
        let reset = token_in(&last_mail_to(&service, "alice@example.com"));

        for raw in [verification, reset] {
            assert!(matches!(
                service.login_with_token(&SessionToken::parse(raw)),
                Err(AccountError::InvalidToken)
            ));
        }
        assert!(matches!(
            service.login_with_token(&SessionToken::parse("")),
            Err(AccountError::MissingField("Token"))
        ));

        // A session token is not a verification token either
        assert!(matches!(
            service.verify_email(&VerificationToken::parse(response.token.as_str())),
            Err(AccountError::InvalidToken)
        ));
    }

    #[test]
    fn test_login_prunes_expired_sessions_and_stays_bounded() {
        let service = new_service();
        let registered = service.register("alice@example.com", "secret").unwrap();

        let mut stored = service.store().find_by_id(&registered.user.id).unwrap().unwrap();
        stored.sessions.push(ActiveSession {
            id: "expired".to_string(),
            expires_at: 1,
        });
        service.store().save(&stored).unwrap();

        service.login("alice@example.com", "secret").unwrap();
        let stored = service.store().find_by_id(&registered.user.id).unwrap().unwrap();
        assert!(stored.sessions.iter().all(|s| s.id != "expired"));
        assert_eq!(stored.sessions.len(), 2);

        let mut latest = None;
        for _ in 0..(MAX_ACTIVE_SESSIONS + 10) {
            latest = Some(service.login("alice@example.com", "secret").unwrap());
        }
        let stored = service.store().find_by_id(&registered.user.id).unwrap().unwrap();
        assert_eq!(stored.sessions.len(), MAX_ACTIVE_SESSIONS);

        // The newest session survives and the registration session was dropped
        assert!(service.login_with_token(&latest.unwrap().token).is_ok());
        assert!(matches!(
            service.login_with_token(&registered.token),
            Err(AccountError::InvalidToken)
        ));
    }

    #[test]
    fn test_logout_revokes_only_that_session() {
        let service = new_service();
        let first = service.register("alice@example.com", "secret").unwrap();
        let second = service.login("alice@example.com", "secret").unwrap();

        service.logout(&first.token).unwrap();

        assert!(matches!(
            service.login_with_token(&first.token),
            Err(AccountError::InvalidToken)
        ));
        assert!(service.login_with_token(&second.token).is_ok());
    }

    #[test]
    fn test_verification_marks_only_matching_user() {
        let service = new_service();
        service.register("alice@example.com", "secret").unwrap();
        let bob = service.register("bob@example.com", "secret").unwrap();

        let alice = verified_user_from_mail(&service, "alice@example.com");
        assert!(alice.verified);
        assert!(!service.get_user(&bob.user.id).unwrap().verified);
    }

    fn verified_user_from_mail(service: &TestService, email: &str) -> PublicUser {
        let token = token_in(&last_mail_to(service, email));
        service.verify_email(&VerificationToken::parse(token)).unwrap()
    }

    #[test]
    fn test_verification_with_unknown_subject() {
        let service = new_service();
        let issued = service
            .signer()
            .issue::<EmailVerification>("ghost@example.com")
            .unwrap();
        assert!(matches!(
            service.verify_email(&issued.token),
            Err(AccountError::UserNotFound)
        ));
    }

    #[test]
    fn test_resend_verification() {
        let service = new_service();
        service.register("alice@example.com", "secret").unwrap();

        let message = service.resend_verification("alice@example.com").unwrap();
        assert_eq!(message, RESEND_REQUESTED_MESSAGE);
        assert_eq!(service.mailer().transport().sent_to("alice@example.com").len(), 2);

        verified_user_from_mail(&service, "alice@example.com");
        let unknown = service.resend_verification("nobody@example.com").unwrap();
        let verified = service.resend_verification("alice@example.com").unwrap();
        assert_eq!(unknown, verified);
        assert_eq!(service.mailer().sent().len(), 2);
    }

    #[test]
    fn test_password_reset_flow() {
        let service = new_service();
        let registered = service.register("alice@example.com", "secret").unwrap();

        service.request_password_reset("ALICE@example.com").unwrap();
        let reset = ResetToken::parse(token_in(&last_mail_to(&service, "alice@example.com")));

        let message = service.complete_password_reset(&reset, "new-secret").unwrap();
        assert_eq!(message, PASSWORD_RESET_MESSAGE);

        assert!(service.login("alice@example.com", "new-secret").is_ok());
        assert!(matches!(
            service.login("alice@example.com", "secret"),
            Err(AccountError::InvalidCredentials)
        ));

        // Single use, and older sessions are gone
        assert!(matches!(
            service.complete_password_reset(&reset, "third-secret"),
            Err(AccountError::InvalidToken)
        ));
        assert!(matches!(
            service.login_with_token(&registered.token),
            Err(AccountError::InvalidToken)
        ));

        let last = last_mail_to(&service, "alice@example.com");
        assert!(last.body.contains("was just changed"));
    }

    #[test]
    fn test_newer_reset_request_replaces_older_token() {
        let service = new_service();
        service.register("alice@example.com", "secret").unwrap();

        service.request_password_reset("alice@example.com").unwrap();
        let first = ResetToken::parse(token_in(&last_mail_to(&service, "alice@example.com")));
        service.request_password_reset("alice@example.com").unwrap();
        let second = ResetToken::parse(token_in(&last_mail_to(&service, "alice@example.com")));

        assert!(matches!(
            service.complete_password_reset(&first, "new-secret"),
            Err(AccountError::InvalidToken)
        ));
        assert!(service.complete_password_reset(&second, "new-secret").is_ok());
    }

    #[test]
    fn test_reset_request_for_unknown_email_looks_the_same() {
        let service = new_service();
        service.register("alice@example.com", "secret").unwrap();
        let before = service.mailer().sent().len();

        let unknown = service.request_password_reset("nobody@example.com").unwrap();
        assert_eq!(service.mailer().sent().len(), before);

        let known = service.request_password_reset("alice@example.com").unwrap();
        assert_eq!(unknown, known);
        assert_eq!(service.mailer().sent().len(), before + 1);
    }

    #[test]
    fn test_reset_mail_failure_answers_like_unknown_email() {
        let service = new_service();
        let alice = service.register("alice@example.com", "secret").unwrap();
        service
            .mailer()
            .transport()
            .fail_next_deliveries("relay down");

        let known = service.request_password_reset("alice@example.com").unwrap();
        let unknown = service.request_password_reset("nobody@example.com").unwrap();
        assert_eq!(known, unknown);
        assert_eq!(known, RESET_REQUESTED_MESSAGE);

        // The reset stays pending for a later retry
        let stored = service.store().find_by_id(&alice.user.id).unwrap().unwrap();
        assert!(stored.reset_token_id.is_some());
    }

    #[test]
    fn test_resend_mail_failure_answers_like_unknown_email() {
        let service = new_service();
        service.register("alice@example.com", "secret").unwrap();
        service
            .mailer()
            .transport()
            .fail_next_deliveries("relay down");

        let known = service.resend_verification("alice@example.com").unwrap();
        let unknown = service.resend_verification("nobody@example.com").unwrap();
        assert_eq!(known, unknown);
        assert_eq!(known, RESEND_REQUESTED_MESSAGE);
    }

    #[test]
    fn test_complete_reset_fails_fast_on_bad_input() {
        let service = new_service();
        let issued = service.signer().issue::<PasswordReset>("missing").unwrap();

        assert!(matches!(
            service.complete_password_reset(&ResetToken::parse(""), "new-secret"),
            Err(AccountError::MissingField("Token"))
        ));
        assert!(matches!(
            service.complete_password_reset(&issued.token, ""),
            Err(AccountError::MissingField("Password"))
        ));
        assert!(matches!(
            service.complete_password_reset(&issued.token, "short"),
            Err(AccountError::PasswordTooShort)
        ));
        // A well-signed token with no pending reset behind it
        assert!(matches!(
            service.complete_password_reset(&issued.token, "new-secret"),
            Err(AccountError::InvalidToken)
        ));
    }

    #[test]
    fn test_profile_update_requires_verified_user() {
        let service = new_service();
        let unverified = service.register("bob@example.com", "secret").unwrap();
        let profile = Profile {
            name: "Bob".to_string(),
            ..Profile::default()
        };

        assert!(matches!(
            service.update_profile(&unverified.user.id, &profile),
            Err(AccountError::NotVerified)
        ));
        assert!(matches!(
            service.update_profile("no-such-id", &profile),
            Err(AccountError::NotVerified)
        ));

        let alice = verified_user(&service, "alice@example.com");
        let updated = service
            .update_profile(
                &alice.id,
                &Profile {
                    name: " Alice ".to_string(),
                    team_code: Some("RED-7".to_string()),
                    ..Profile::default()
                },
            )
            .unwrap();
        assert_eq!(updated.profile.name, "Alice");
        assert!(updated.profile_complete);
        assert!(updated.updated_at >= alice.updated_at);
    }

    #[test]
    fn test_submission_last_write_wins() {
        let service = new_service();
        let user = service.register("alice@example.com", "secret").unwrap().user;

        for (code, title) in [("repo-1", "First"), ("repo-2", "Second")] {
            service
                .update_submission(
                    &user.id,
                    &Submission {
                        code: code.to_string(),
                        title: title.to_string(),
                    },
                )
                .unwrap();
        }

        let stored = service.get_user(&user.id).unwrap().submission.unwrap();
        assert_eq!(stored.code, "repo-2");
        assert_eq!(stored.title, "Second");

        assert!(matches!(
            service.update_submission(
                "no-such-id",
                &Submission {
                    code: "x".to_string(),
                    title: "y".to_string(),
                }
            ),
            Err(AccountError::UserNotFound)
        ));
    }

    fn seed_named_users(service: &TestService, names: &[&str]) {
        for name in names {
            let email = format!("{}@example.com", name.to_lowercase());
            let user = verified_user(service, &email);
            service
                .update_profile(
                    &user.id,
                    &Profile {
                        name: name.to_string(),
                        ..Profile::default()
                    },
                )
                .unwrap();
        }
    }

    #[test]
    fn test_listing_pages_by_name() {
        let service = new_service();
        seed_named_users(&service, &["Eve", "Bob", "Dan", "Alice", "Carol"]);

        let first = service.list_users(&ListQuery::new(0, 2)).unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.total_pages, 3);
        let names: Vec<_> = first.users.iter().map(|u| u.profile.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);

        let last = service.list_users(&ListQuery::new(2, 2)).unwrap();
        let names: Vec<_> = last.users.iter().map(|u| u.profile.name.as_str()).collect();
        assert_eq!(names, vec!["Eve"]);

        let beyond = service.list_users(&ListQuery::new(9, 2)).unwrap();
        assert!(beyond.users.is_empty());
        assert_eq!(beyond.total_pages, 3);
    }

    #[test]
    fn test_listing_search() {
        let service = new_service();
        seed_named_users(&service, &["Alice", "Alicia", "Bob"]);

        let page = service
            .list_users(&ListQuery::new(0, 10).with_search("ALIC"))
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.total_pages, 1);

        let none = service
            .list_users(&ListQuery::new(0, 10).with_search("zzz"))
            .unwrap();
        assert_eq!(none.total, 0);
        assert_eq!(none.total_pages, 0);
    }

    #[test]
    fn test_listing_rejects_bad_page_size() {
        let service = new_service();
        for size in [0, MAX_PAGE_SIZE + 1] {
            assert!(matches!(
                service.list_users(&ListQuery::new(0, size)),
                Err(AccountError::InvalidPage(_))
            ));
        }

        let capped = new_service().with_max_page_size(10);
        assert!(capped.list_users(&ListQuery::new(0, 11)).is_err());
        assert!(capped.list_users(&ListQuery::new(usize::MAX, 10)).is_err());
    }

    #[test]
    fn test_workflow_against_file_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");

        let user_id = {
            let service = service_with(JsonFileStore::open(&path).unwrap());
            let response = service.register("alice@example.com", "secret").unwrap();
            let token = token_in(&service.mailer().sent()[0]);
            service.verify_email(&VerificationToken::parse(token)).unwrap();
            response.user.id
        };

        let reopened = service_with(JsonFileStore::open(&path).unwrap());
        let user = reopened.get_user(&user_id).unwrap();
        assert!(user.verified);
        assert!(reopened.login("alice@example.com", "secret").is_ok());
    }
}
