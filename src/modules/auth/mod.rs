pub mod file_store;
pub mod memory;
pub mod password;
pub mod profile;
pub mod service;
pub mod store;
pub mod tokens;

// Re-export the main types and functions
pub use file_store::JsonFileStore;
pub use memory::{MemoryStore, UserTable};
pub use password::{hash_password, validate_password, verify_password, PasswordHash};
pub use profile::{validate_profile, validate_submission};
pub use service::{AccountService, AuthResponse, ListQuery, UserPage};
pub use store::{CredentialStore, Profile, PublicUser, Submission, User, UserQuery, UserUpdate};
pub use tokens::{
    Claims, EmailVerification, PasswordReset, ResetToken, Session, SessionToken, Token,
    TokenLifetimes, TokenPurpose, TokenSigner, VerificationToken,
};
