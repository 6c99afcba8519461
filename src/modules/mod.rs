// Declare all modules
pub mod auth;
pub mod client;
pub mod config;
pub mod email;
pub mod error;
pub mod security;
pub mod utils;

// No re-exports here as they're handled in lib.rs
