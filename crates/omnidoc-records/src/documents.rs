//! Document metadata. File bytes live in storage managed by the server;
//! this module only records where they are.

use crate::error::require;
use crate::{Abonne, RecordError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Type label of generated certificates.
pub const CERTIFICATE_TYPE: &str = "certificate";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub abonne_id: i64,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub nom_fichier: String,
    pub chemin_fichier: String,
    pub taille_fichier: i64,
    pub created_by: Option<i64>,
    pub created_at: String,
}

/// Metadata of a file that has already been written to storage.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub doc_type: String,
    pub nom_fichier: String,
    pub chemin_fichier: String,
    pub taille_fichier: i64,
    pub created_by: Option<i64>,
}

fn map_row_to_document(row: &Row) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        abonne_id: row.get(1)?,
        doc_type: row.get(2)?,
        nom_fichier: row.get(3)?,
        chemin_fichier: row.get(4)?,
        taille_fichier: row.get(5)?,
        created_by: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const SELECT: &str = "SELECT id, abonne_id, type, nom_fichier, chemin_fichier, taille_fichier,
                             created_by, created_at
                      FROM documents";

/// Documents of a subscriber, newest first.
pub fn list_documents(conn: &Connection, owner: &Abonne) -> Result<Vec<Document>, RecordError> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE abonne_id = ?1 ORDER BY created_at DESC, id DESC",
        SELECT
    ))?;
    let rows = stmt.query_map([owner.id], map_row_to_document)?;
    let mut documents = Vec::new();
    for row in rows {
        documents.push(row?);
    }
    Ok(documents)
}

pub(crate) fn count_documents(conn: &Connection, abonne_id: i64) -> Result<i64, RecordError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE abonne_id = ?1",
        [abonne_id],
        |row| row.get(0),
    )?)
}

pub fn get_document(conn: &Connection, owner: &Abonne, id: i64) -> Result<Document, RecordError> {
    conn.query_row(
        &format!("{} WHERE id = ?1 AND abonne_id = ?2", SELECT),
        params![id, owner.id],
        map_row_to_document,
    )
    .optional()?
    .ok_or_else(|| RecordError::not_found("document", id))
}

pub fn create_document(
    conn: &Connection,
    owner: &Abonne,
    doc: &NewDocument,
) -> Result<Document, RecordError> {
    let doc_type = require(&Some(doc.doc_type.clone()), "type")?;
    conn.execute(
        "INSERT INTO documents (abonne_id, type, nom_fichier, chemin_fichier, taille_fichier, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            owner.id,
            doc_type,
            doc.nom_fichier,
            doc.chemin_fichier,
            doc.taille_fichier,
            doc.created_by,
        ],
    )?;
    get_document(conn, owner, conn.last_insert_rowid())
}

/// Relabels a document. The file itself is untouched.
pub fn update_document_type(
    conn: &Connection,
    owner: &Abonne,
    id: i64,
    doc_type: Option<&str>,
) -> Result<Document, RecordError> {
    let doc_type = require(&doc_type.map(str::to_string), "type")?;
    let count = conn.execute(
        "UPDATE documents SET type = ?1 WHERE id = ?2 AND abonne_id = ?3",
        params![doc_type, id, owner.id],
    )?;
    if count == 0 {
        return Err(RecordError::not_found("document", id));
    }
    get_document(conn, owner, id)
}

pub fn delete_document(conn: &Connection, owner: &Abonne, id: i64) -> Result<Document, RecordError> {
    let document = get_document(conn, owner, id)?;
    conn.execute(
        "DELETE FROM documents WHERE id = ?1 AND abonne_id = ?2",
        params![id, owner.id],
    )?;
    Ok(document)
}

/// Deletes the rows of `owner` that point at `chemin` and returns them.
///
/// Used before re-recording a file written under a fixed name, so the path
/// keeps a single row.
pub fn delete_documents_at(
    conn: &Connection,
    owner: &Abonne,
    chemin: &str,
) -> Result<Vec<Document>, RecordError> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE abonne_id = ?1 AND chemin_fichier = ?2 ORDER BY id",
        SELECT
    ))?;
    let rows = stmt.query_map(params![owner.id, chemin], map_row_to_document)?;
    let mut removed = Vec::new();
    for row in rows {
        removed.push(row?);
    }
    conn.execute(
        "DELETE FROM documents WHERE abonne_id = ?1 AND chemin_fichier = ?2",
        params![owner.id, chemin],
    )?;
    Ok(removed)
}

/// Whether any row other than `except` still points at `chemin`.
pub fn is_path_referenced(
    conn: &Connection,
    chemin: &str,
    except: Option<i64>,
) -> Result<bool, RecordError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE chemin_fichier = ?1 AND id IS NOT ?2",
        params![chemin, except],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
