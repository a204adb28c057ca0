//! Authentication service for Omnidoc.
//!
//! Verifies staff credentials against argon2 password hashes and issues
//! stateless HS256 bearer tokens that embed the principal's id, role and
//! agency. Every protected HTTP route and the notification handshake call
//! [`TokenIssuer::verify`].

mod login;
mod password;
mod tokens;

pub use login::{login, LoginOutcome};
pub use password::{hash_password, verify_password};
pub use tokens::{Claims, TokenIssuer, DEFAULT_TOKEN_TTL_SECS};

use thiserror::Error;

/// Errors produced by the authentication service.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password. The two cases are deliberately
    /// indistinguishable to callers.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    TokenInvalid,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}
