//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionManager`: login, logout, token expiry, session bootstrap
//! - `SignupFlow`: the ordered account-creation protocol
//! - `TokenStore`: persistence of the bearer token (keychain, file, memory)
//! - `Session` / `SessionCell`: the shared in-memory session
//!
//! A saved token is reused across restarts and dropped on the first 401/403.

pub mod error;
pub mod manager;
pub mod session;
pub mod signup;
pub mod token_store;

pub use error::{AuthError, SessionFault, SignupError};
pub use manager::SessionManager;
pub use session::{Session, SessionCell, Token};
pub use signup::{SignupFlow, SignupState, SignupStep};
pub use token_store::{
    open_token_store, FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore,
};
