// First, declare the modules folder itself
mod modules;

// Re-export everything from modules for easier access
pub use modules::{auth, client, config, email, error, security, utils};

// Re-export commonly used types
pub use modules::auth::service::AccountService;
pub use modules::client::StateContainer;
pub use modules::config::ServiceConfig;
pub use modules::email::manager::SecureEmailManager;
pub use modules::error::{AccountError, AccountResult};

// Constants
pub const DEFAULT_CONFIG_FILE: &str = "hackboard.json";
pub const DEFAULT_USERS_FILE: &str = "users.json";
pub const KEYRING_SERVICE: &str = "hackboard";
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_PAGE_SIZE: usize = 100;

// Type aliases
pub type HmacSha256 = hmac::Hmac<sha2::Sha256>;
