//! Spouse records. Every operation takes the owning subscriber, which the
//! caller has already resolved through a scoped lookup.

use crate::error::{non_blank, require};
use crate::{Abonne, RecordError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conjoint {
    pub id: i64,
    pub abonne_id: i64,
    pub nom: String,
    pub prenom: String,
    pub date_naissance: Option<String>,
    pub date_mariage: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConjointInput {
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub date_naissance: Option<String>,
    pub date_mariage: Option<String>,
}

const SELECT: &str = "SELECT id, abonne_id, nom, prenom, date_naissance, date_mariage, created_at
                      FROM conjoints";

fn map_row_to_conjoint(row: &Row) -> rusqlite::Result<Conjoint> {
    Ok(Conjoint {
        id: row.get(0)?,
        abonne_id: row.get(1)?,
        nom: row.get(2)?,
        prenom: row.get(3)?,
        date_naissance: row.get(4)?,
        date_mariage: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn list_conjoints(conn: &Connection, owner: &Abonne) -> Result<Vec<Conjoint>, RecordError> {
    let mut stmt = conn.prepare(&format!("{} WHERE abonne_id = ?1 ORDER BY id", SELECT))?;
    let rows = stmt.query_map([owner.id], map_row_to_conjoint)?;
    let mut conjoints = Vec::new();
    for row in rows {
        conjoints.push(row?);
    }
    Ok(conjoints)
}

pub fn get_conjoint(conn: &Connection, owner: &Abonne, id: i64) -> Result<Conjoint, RecordError> {
    conn.query_row(
        &format!("{} WHERE id = ?1 AND abonne_id = ?2", SELECT),
        params![id, owner.id],
        map_row_to_conjoint,
    )
    .optional()?
    .ok_or_else(|| RecordError::not_found("conjoint", id))
}

pub fn create_conjoint(
    conn: &Connection,
    owner: &Abonne,
    input: &ConjointInput,
) -> Result<Conjoint, RecordError> {
    let nom = require(&input.nom, "nom")?;
    let prenom = require(&input.prenom, "prenom")?;
    conn.execute(
        "INSERT INTO conjoints (abonne_id, nom, prenom, date_naissance, date_mariage)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            owner.id,
            nom,
            prenom,
            non_blank(&input.date_naissance),
            non_blank(&input.date_mariage),
        ],
    )?;
    get_conjoint(conn, owner, conn.last_insert_rowid())
}

/// Replaces the spouse's fields; absent optional fields keep their value.
pub fn update_conjoint(
    conn: &Connection,
    owner: &Abonne,
    id: i64,
    input: &ConjointInput,
) -> Result<Conjoint, RecordError> {
    let current = get_conjoint(conn, owner, id)?;
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
    let date_mariage = match input.date_mariage {
        Some(_) => non_blank(&input.date_mariage),
        None => current.date_mariage,
    };

    conn.execute(
        "UPDATE conjoints SET nom = ?1, prenom = ?2, date_naissance = ?3, date_mariage = ?4
         WHERE id = ?5 AND abonne_id = ?6",
        params![nom, prenom, date_naissance, date_mariage, id, owner.id],
    )?;
    get_conjoint(conn, owner, id)
}

pub fn delete_conjoint(conn: &Connection, owner: &Abonne, id: i64) -> Result<Conjoint, RecordError> {
    let conjoint = get_conjoint(conn, owner, id)?;
    let count = conn.execute(
        "DELETE FROM conjoints WHERE id = ?1 AND abonne_id = ?2",
        params![id, owner.id],
    )?;
    if count == 0 {
        return Err(RecordError::not_found("conjoint", id));
    }
    Ok(conjoint)
}
