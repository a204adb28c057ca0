//! Staff accounts. Password hashes are produced by the caller and never
//! leave this module except through [`get_password_hash`].

use crate::error::{is_unique_violation, non_blank, require};
use crate::RecordError;
use omnidoc_types::Role;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub nom: String,
    pub prenom: String,
    pub email: String,
    pub role: Role,
    pub agence: Option<String>,
    pub ville: Option<String>,
    pub poste: Option<String>,
    pub created_at: String,
}

/// Request body for create and update. `password` is only read by the
/// caller, which hashes it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserInput {
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub agence: Option<String>,
    pub ville: Option<String>,
    pub poste: Option<String>,
}

const SELECT: &str =
    "SELECT id, nom, prenom, email, role, agence, ville, poste, created_at FROM users";

fn map_row_to_user(row: &Row) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    let role = role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(User {
        id: row.get(0)?,
        nom: row.get(1)?,
        prenom: row.get(2)?,
        email: row.get(3)?,
        role,
        agence: row.get(5)?,
        ville: row.get(6)?,
        poste: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn map_duplicate(err: rusqlite::Error) -> RecordError {
    if is_unique_violation(&err) {
        RecordError::Duplicate("email already in use".to_string())
    } else {
        RecordError::Database(err)
    }
}

fn require_email(value: &Option<String>) -> Result<String, RecordError> {
    let email = require(value, "email")?.to_lowercase();
    if !email.contains('@') {
        return Err(RecordError::Validation("email is invalid".to_string()));
    }
    Ok(email)
}

pub fn count_users(conn: &Connection) -> Result<i64, RecordError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>, RecordError> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY created_at DESC, id DESC", SELECT))?;
    let rows = stmt.query_map([], map_row_to_user)?;
    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

pub fn get_user(conn: &Connection, id: i64) -> Result<User, RecordError> {
    conn.query_row(&format!("{} WHERE id = ?1", SELECT), [id], map_row_to_user)
        .optional()?
        .ok_or_else(|| RecordError::not_found("user", id))
}

/// Checks the fields a new user needs, before any hashing work is done.
pub fn validate_new_user(input: &UserInput) -> Result<(), RecordError> {
    require(&input.nom, "nom")?;
    require(&input.prenom, "prenom")?;
    require_email(&input.email)?;
    require(&input.password, "password")?;
    if input.role.is_none() {
        return Err(RecordError::required("role"));
    }
    Ok(())
}

pub fn create_user(
    conn: &Connection,
    input: &UserInput,
    password_hash: &str,
) -> Result<User, RecordError> {
    validate_new_user(input)?;
    let role = input.role.ok_or_else(|| RecordError::required("role"))?;

    conn.execute(
        "INSERT INTO users (nom, prenom, email, password_hash, role, agence, ville, poste)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            require(&input.nom, "nom")?,
            require(&input.prenom, "prenom")?,
            require_email(&input.email)?,
            password_hash,
            role.as_str(),
            non_blank(&input.agence),
            non_blank(&input.ville),
            non_blank(&input.poste),
        ],
    )
    .map_err(map_duplicate)?;

    get_user(conn, conn.last_insert_rowid())
}

/// Applies the supplied fields. A new hash is written only when given.
pub fn update_user(
    conn: &Connection,
    id: i64,
    input: &UserInput,
    password_hash: Option<&str>,
) -> Result<User, RecordError> {
    let current = get_user(conn, id)?;

    let nom = match input.nom {
        Some(_) => require(&input.nom, "nom")?,
        None => current.nom,
    };
    let prenom = match input.prenom {
        Some(_) => require(&input.prenom, "prenom")?,
        None => current.prenom,
    };
    let email = match input.email {
        Some(_) => require_email(&input.email)?,
        None => current.email,
    };
    let role = input.role.unwrap_or(current.role);
    let agence = match input.agence {
        Some(_) => non_blank(&input.agence),
        None => current.agence,
    };
    let ville = match input.ville {
        Some(_) => non_blank(&input.ville),
        None => current.ville,
    };
    let poste = match input.poste {
        Some(_) => non_blank(&input.poste),
        None => current.poste,
    };

    conn.execute(
        "UPDATE users SET nom = ?1, prenom = ?2, email = ?3, role = ?4, agence = ?5,
                          ville = ?6, poste = ?7
         WHERE id = ?8",
        params![nom, prenom, email, role.as_str(), agence, ville, poste, id],
    )
    .map_err(map_duplicate)?;

    if let Some(hash) = password_hash {
        set_password_hash(conn, id, hash)?;
    }

    get_user(conn, id)
}

pub fn delete_user(conn: &Connection, id: i64) -> Result<User, RecordError> {
    let user = get_user(conn, id)?;
    conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
    Ok(user)
}

pub fn get_password_hash(conn: &Connection, id: i64) -> Result<String, RecordError> {
    conn.query_row("SELECT password_hash FROM users WHERE id = ?1", [id], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or_else(|| RecordError::not_found("user", id))
}

pub fn set_password_hash(conn: &Connection, id: i64, hash: &str) -> Result<(), RecordError> {
    let count = conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2",
        params![hash, id],
    )?;
    if count == 0 {
        return Err(RecordError::not_found("user", id));
    }
    Ok(())
}
