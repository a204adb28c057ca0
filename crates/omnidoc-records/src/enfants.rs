//! Child records, owned by a subscriber resolved through a scoped lookup.

use crate::error::{non_blank, require};
use crate::{Abonne, RecordError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enfant {
    pub id: i64,
    pub abonne_id: i64,
    pub nom: String,
    pub prenom: String,
    pub date_naissance: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnfantInput {
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub date_naissance: Option<String>,
}

fn map_row_to_enfant(row: &Row) -> rusqlite::Result<Enfant> {
    Ok(Enfant {
        id: row.get(0)?,
        abonne_id: row.get(1)?,
        nom: row.get(2)?,
        prenom: row.get(3)?,
        date_naissance: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Children ordered by birth date, undated ones last.
pub fn list_enfants(conn: &Connection, owner: &Abonne) -> Result<Vec<Enfant>, RecordError> {
    let mut stmt = conn.prepare(
        "SELECT id, abonne_id, nom, prenom, date_naissance, created_at
         FROM enfants WHERE abonne_id = ?1
         ORDER BY date_naissance IS NULL, date_naissance, id",
    )?;
    let rows = stmt.query_map([owner.id], map_row_to_enfant)?;
    let mut enfants = Vec::new();
    for row in rows {
        enfants.push(row?);
    }
    Ok(enfants)
}

pub fn get_enfant(conn: &Connection, owner: &Abonne, id: i64) -> Result<Enfant, RecordError> {
    conn.query_row(
        "SELECT id, abonne_id, nom, prenom, date_naissance, created_at
         FROM enfants WHERE id = ?1 AND abonne_id = ?2",
        params![id, owner.id],
        map_row_to_enfant,
    )
    .optional()?
    .ok_or_else(|| RecordError::not_found("enfant", id))
}

pub fn create_enfant(
    conn: &Connection,
    owner: &Abonne,
    input: &EnfantInput,
) -> Result<Enfant, RecordError> {
    let nom = require(&input.nom, "nom")?;
    let prenom = require(&input.prenom, "prenom")?;
    conn.execute(
        "INSERT INTO enfants (abonne_id, nom, prenom, date_naissance) VALUES (?1, ?2, ?3, ?4)",
        params![owner.id, nom, prenom, non_blank(&input.date_naissance)],
    )?;
    get_enfant(conn, owner, conn.last_insert_rowid())
}

pub fn update_enfant(
    conn: &Connection,
    owner: &Abonne,
    id: i64,
    input: &EnfantInput,
) -> Result<Enfant, RecordError> {
    let current = get_enfant(conn, owner, id)?;
    let nom = match input.nom {
        Some(_) => require(&input.nom, "nom")?,
        None => current.nom,
    };
    let prenom = match input.prenom {
        Some(_) => require(&input.prenom, "prenom")?,
        None => current.prenom,
    };
    let date_naissance = match input.date_naissance {
        Some(_) => non_blank(&input.date_naissance),
        None => current.date_naissance,
    };

    conn.execute(
        "UPDATE enfants SET nom = ?1, prenom = ?2, date_naissance = ?3
         WHERE id = ?4 AND abonne_id = ?5",
        params![nom, prenom, date_naissance, id, owner.id],
    )?;
    get_enfant(conn, owner, id)
}

pub fn delete_enfant(conn: &Connection, owner: &Abonne, id: i64) -> Result<Enfant, RecordError> {
    let enfant = get_enfant(conn, owner, id)?;
    conn.execute(
        "DELETE FROM enfants WHERE id = ?1 AND abonne_id = ?2",
        params![id, owner.id],
    )?;
    Ok(enfant)
}
