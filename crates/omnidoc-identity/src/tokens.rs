//! HS256 bearer tokens.

use crate::AuthError;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use omnidoc_types::{Principal, Role};
use serde::{Deserialize, Serialize};

/// Token lifetime used when the configuration does not set one (24 hours).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Claims carried by every bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id, as a decimal string.
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub agence: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies tokens with a shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Signs a token for `principal`, valid for the configured lifetime.
    pub fn issue(&self, principal: &Principal) -> Result<String, AuthError> {
        let iat = chrono::Utc::now().timestamp();
        self.issue_at(principal, iat)
    }

    fn issue_at(&self, principal: &Principal, iat: i64) -> Result<String, AuthError> {
        let claims = Claims {
            sub: principal.id.to_string(),
            email: principal.email.clone(),
            role: principal.role,
            agence: principal.agence.clone(),
            iat,
            exp: iat.saturating_add(self.ttl_secs as i64),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Verifies the signature and expiry of `token` and recovers the principal.
    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            }
        })?;

        let claims = data.claims;
        let id = claims.sub.parse::<i64>().map_err(|_| AuthError::TokenInvalid)?;
        Ok(Principal {
            id,
            email: claims.email,
            role: claims.role,
            agence: claims.agence,
        })
    }
}
