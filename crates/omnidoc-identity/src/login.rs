//! Credential check and token issuance.

use crate::{password::verify_password, AuthError, TokenIssuer};
use omnidoc_types::{Principal, Role};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

/// Result of a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub principal: Principal,
    pub nom: String,
    pub prenom: String,
}

struct StoredCredentials {
    id: i64,
    email: String,
    password_hash: String,
    role: Role,
    agence: Option<String>,
    nom: String,
    prenom: String,
}

/// Looks up `email`, checks `password` and issues a token.
///
/// Returns [`AuthError::InvalidCredentials`] both when the email is unknown
/// and when the password does not match.
pub fn login(
    conn: &Connection,
    issuer: &TokenIssuer,
    email: &str,
    password: &str,
) -> Result<LoginOutcome, AuthError> {
    let stored = conn
        .query_row(
            "SELECT id, email, password_hash, role, agence, nom, prenom
             FROM users WHERE email = ?1",
            [email.trim().to_lowercase()],
            |row| {
                let role_label: String = row.get(3)?;
                let role = role_label.parse::<Role>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(StoredCredentials {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                    role,
                    agence: row.get(4)?,
                    nom: row.get(5)?,
                    prenom: row.get(6)?,
                })
            },
        )
        .optional()?;

    let Some(stored) = stored else {
        tracing::info!("login attempt for unknown email");
        return Err(AuthError::InvalidCredentials);
    };

    if !verify_password(password, &stored.password_hash) {
        tracing::info!(user_id = stored.id, "login attempt with wrong password");
        return Err(AuthError::InvalidCredentials);
    }

    let principal = Principal {
        id: stored.id,
        email: stored.email,
        role: stored.role,
        agence: stored.agence,
    };
    let token = issuer.issue(&principal)?;

    Ok(LoginOutcome {
        token,
        principal,
        nom: stored.nom,
        prenom: stored.prenom,
    })
}
