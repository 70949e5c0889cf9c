//! Larder Authentication
//!
//! This crate provides credential hashing, opaque bearer tokens, cache-assisted
//! session resolution and the authorization middleware chain.

pub mod error;
pub mod identity;
pub mod middleware;
pub mod password;
pub mod permissions;
pub mod session;
pub mod store;
pub mod tokens;
pub mod validation;

pub use error::AuthError;
pub use identity::{ActiveUser, Caller, CallerIdentity};
pub use middleware::{
    PermissionGate, authenticate, require_activated, require_authenticated, require_permission,
};
pub use password::Credential;
pub use permissions::PermissionStore;
pub use session::{SessionOptions, SessionResolver};
pub use store::AccountStore;
pub use tokens::{
    Token, TokenManager, generate_token, hash_token, spawn_token_reaper_task,
    validate_token_plaintext,
};
pub use validation::{FieldErrors, Validator};
