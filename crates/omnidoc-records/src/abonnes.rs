//! Subscriber records.

use crate::documents::{self, Document};
use crate::error::{is_unique_violation, non_blank, require};
use crate::query::Clauses;
use crate::{conjoints, enfants, AccessScope, Conjoint, Enfant, RecordError};
use omnidoc_types::{Principal, SubscriptionStatus};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A subscriber row, with its derived status and the creating user's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abonne {
    pub id: i64,
    pub nom: String,
    pub prenom: String,
    pub date_naissance: Option<String>,
    pub cin: Option<String>,
    pub telephone: Option<String>,
    pub ville: Option<String>,
    pub adresse: Option<String>,
    pub numero_identification: String,
    pub date_debut: String,
    pub date_expiration: String,
    pub agence: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: String,
    pub statut: SubscriptionStatus,
    pub user_nom: Option<String>,
    pub user_prenom: Option<String>,
}

/// Subscriber detail: the record plus every dependent collection.
#[derive(Debug, Clone, Serialize)]
pub struct AbonneDetail {
    #[serde(flatten)]
    pub abonne: Abonne,
    pub conjoints: Vec<Conjoint>,
    pub enfants: Vec<Enfant>,
    pub documents: Vec<Document>,
}

/// Request body for create and update. On update, absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AbonneInput {
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub date_naissance: Option<String>,
    pub cin: Option<String>,
    pub telephone: Option<String>,
    pub ville: Option<String>,
    pub adresse: Option<String>,
    pub numero_identification: Option<String>,
    pub date_debut: Option<String>,
    pub date_expiration: Option<String>,
    pub agence: Option<String>,
}

/// Listing filters. Blank values are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AbonneFilter {
    pub agence: Option<String>,
    pub statut: Option<String>,
    pub ville: Option<String>,
    #[serde(rename = "dateDebut")]
    pub date_debut: Option<String>,
    #[serde(rename = "dateFin")]
    pub date_fin: Option<String>,
    pub search: Option<String>,
}

/// What a subscriber deletion removed; the documents locate files to clean up.
#[derive(Debug, Clone)]
pub struct DeletedAbonne {
    pub abonne: Abonne,
    pub documents: Vec<Document>,
}

pub(crate) const SEARCH_COLUMNS: &[&str] = &[
    "a.nom",
    "a.prenom",
    "a.cin",
    "a.numero_identification",
    "a.telephone",
    "a.ville",
];

pub(crate) const STATUT_SQL: &str =
    "CASE WHEN a.date_expiration >= date('now') THEN 'actif' ELSE 'expire' END";

fn select_sql() -> String {
    select_sql_with("")
}

/// Subscriber SELECT; `extra` columns start at index 17.
pub(crate) fn select_sql_with(extra: &str) -> String {
    format!(
        "SELECT a.id, a.nom, a.prenom, a.date_naissance, a.cin, a.telephone, a.ville,
                a.adresse, a.numero_identification, a.date_debut, a.date_expiration,
                a.agence, a.user_id, a.created_at, {} AS statut, u.nom, u.prenom{}
         FROM abonnes a LEFT JOIN users u ON u.id = a.user_id",
        STATUT_SQL, extra
    )
}

/// Maps a row produced by the subscriber SELECT.
pub(crate) fn map_row_to_abonne(row: &Row) -> rusqlite::Result<Abonne> {
    let statut: String = row.get(14)?;
    let statut = statut.parse::<SubscriptionStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(14, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Abonne {
        id: row.get(0)?,
        nom: row.get(1)?,
        prenom: row.get(2)?,
        date_naissance: row.get(3)?,
        cin: row.get(4)?,
        telephone: row.get(5)?,
        ville: row.get(6)?,
        adresse: row.get(7)?,
        numero_identification: row.get(8)?,
        date_debut: row.get(9)?,
        date_expiration: row.get(10)?,
        agence: row.get(11)?,
        user_id: row.get(12)?,
        created_at: row.get(13)?,
        statut,
        user_nom: row.get(15)?,
        user_prenom: row.get(16)?,
    })
}

/// Adds the listing filters and scope to `clauses`.
pub(crate) fn apply_filter(clauses: &mut Clauses, scope: &AccessScope, filter: &AbonneFilter) {
    scope.restrict(clauses, "a.agence");
    if let Some(agence) = non_blank(&filter.agence) {
        clauses.push("a.agence = {}", agence);
    }
    if let Some(ville) = non_blank(&filter.ville) {
        clauses.push("a.ville = {}", ville);
    }
    if let Some(debut) = non_blank(&filter.date_debut) {
        clauses.push("a.date_debut >= {}", debut);
    }
    if let Some(fin) = non_blank(&filter.date_fin) {
        clauses.push("a.date_debut <= {}", fin);
    }
    if let Some(term) = non_blank(&filter.search) {
        clauses.push_search(SEARCH_COLUMNS, &term);
    }
}

/// Parses the optional `statut` filter.
pub(crate) fn parse_statut(filter: &AbonneFilter) -> Result<Option<SubscriptionStatus>, RecordError> {
    non_blank(&filter.statut)
        .map(|s| s.parse::<SubscriptionStatus>().map_err(RecordError::Validation))
        .transpose()
}

fn map_duplicate(err: rusqlite::Error) -> RecordError {
    if is_unique_violation(&err) {
        RecordError::Duplicate("numero_identification already exists".to_string())
    } else {
        RecordError::Database(err)
    }
}

/// Inserts a subscriber owned by `creator`.
///
/// Scoped principals always create in their own agency; others may pick one
/// and default to their own.
pub fn create_abonne(
    conn: &Connection,
    scope: &AccessScope,
    input: &AbonneInput,
    creator: &Principal,
) -> Result<Abonne, RecordError> {
    if *scope == AccessScope::Nothing {
        return Err(RecordError::Validation(
            "an agency is required to create subscribers".to_string(),
        ));
    }

    let nom = require(&input.nom, "nom")?;
    let prenom = require(&input.prenom, "prenom")?;
    let numero = require(&input.numero_identification, "numero_identification")?;
    let date_debut = require(&input.date_debut, "date_debut")?;
    let date_expiration = require(&input.date_expiration, "date_expiration")?;

    let agence = match scope.forced_agency() {
        Some(own) => Some(own.to_string()),
        None => non_blank(&input.agence).or_else(|| creator.agence.clone()),
    };

    conn.execute(
        "INSERT INTO abonnes (
            nom, prenom, date_naissance, cin, telephone, ville, adresse,
            numero_identification, date_debut, date_expiration, agence, user_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            nom,
            prenom,
            non_blank(&input.date_naissance),
            non_blank(&input.cin),
            non_blank(&input.telephone),
            non_blank(&input.ville),
            non_blank(&input.adresse),
            numero,
            date_debut,
            date_expiration,
            agence,
            creator.id,
        ],
    )
    .map_err(map_duplicate)?;

    let id = conn.last_insert_rowid();
    get_abonne(conn, &AccessScope::All, id)
}

/// Loads a subscriber; out-of-scope records read as not found.
pub fn get_abonne(conn: &Connection, scope: &AccessScope, id: i64) -> Result<Abonne, RecordError> {
    let mut clauses = Clauses::new();
    clauses.push("a.id = {}", id);
    scope.restrict(&mut clauses, "a.agence");

    conn.query_row(
        &format!("{}{}", select_sql(), clauses.where_sql()),
        clauses.params().as_slice(),
        map_row_to_abonne,
    )
    .optional()?
    .ok_or_else(|| RecordError::not_found("abonne", id))
}

/// Loads a subscriber with its spouses, children and documents.
pub fn get_abonne_detail(
    conn: &Connection,
    scope: &AccessScope,
    id: i64,
) -> Result<AbonneDetail, RecordError> {
    let abonne = get_abonne(conn, scope, id)?;
    let conjoints = conjoints::list_conjoints(conn, &abonne)?;
    let enfants = enfants::list_enfants(conn, &abonne)?;
    let documents = documents::list_documents(conn, &abonne)?;
    Ok(AbonneDetail {
        abonne,
        conjoints,
        enfants,
        documents,
    })
}

/// Lists subscribers matching `filter`, newest subscription first.
pub fn list_abonnes(
    conn: &Connection,
    scope: &AccessScope,
    filter: &AbonneFilter,
) -> Result<Vec<Abonne>, RecordError> {
    let statut = parse_statut(filter)?;
    let mut clauses = Clauses::new();
    apply_filter(&mut clauses, scope, filter);
    if let Some(statut) = statut {
        clauses.push(&format!("{} = {{}}", STATUT_SQL), statut.as_str().to_string());
    }

    let sql = format!(
        "{}{} ORDER BY a.date_debut DESC, a.id DESC",
        select_sql(),
        clauses.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(clauses.params().as_slice(), map_row_to_abonne)?;

    let mut abonnes = Vec::new();
    for row in rows {
        abonnes.push(row?);
    }
    Ok(abonnes)
}

/// Applies the supplied fields to a subscriber.
///
/// The identification number keys the document directory, so it cannot
/// change once documents exist.
pub fn update_abonne(
    conn: &Connection,
    scope: &AccessScope,
    id: i64,
    input: &AbonneInput,
) -> Result<Abonne, RecordError> {
    let current = get_abonne(conn, scope, id)?;

    let mut set_parts: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    let required = [
        ("nom", &input.nom),
        ("prenom", &input.prenom),
        ("date_debut", &input.date_debut),
        ("date_expiration", &input.date_expiration),
    ];
    for (column, value) in required {
        if value.is_some() {
            let value = require(value, column)?;
            values.push(Box::new(value));
            set_parts.push(format!("{} = ?{}", column, values.len()));
        }
    }

    let optional = [
        ("date_naissance", &input.date_naissance),
        ("cin", &input.cin),
        ("telephone", &input.telephone),
        ("ville", &input.ville),
        ("adresse", &input.adresse),
    ];
    for (column, value) in optional {
        if value.is_some() {
            values.push(Box::new(non_blank(value)));
            set_parts.push(format!("{} = ?{}", column, values.len()));
        }
    }

    if input.numero_identification.is_some() {
        let numero = require(&input.numero_identification, "numero_identification")?;
        if numero != current.numero_identification {
            if documents::count_documents(conn, id)? > 0 {
                return Err(RecordError::Validation(
                    "numero_identification cannot change once documents exist".to_string(),
                ));
            }
            values.push(Box::new(numero));
            set_parts.push(format!("numero_identification = ?{}", values.len()));
        }
    }

    // Scoped principals cannot move a subscriber out of their agency.
    if scope.forced_agency().is_none() && input.agence.is_some() {
        values.push(Box::new(non_blank(&input.agence)));
        set_parts.push(format!("agence = ?{}", values.len()));
    }

    if set_parts.is_empty() {
        return Ok(current);
    }

    values.push(Box::new(id));
    let sql = format!(
        "UPDATE abonnes SET {} WHERE id = ?{}",
        set_parts.join(", "),
        values.len()
    );
    let params: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let count = conn.execute(&sql, params.as_slice()).map_err(map_duplicate)?;
    if count == 0 {
        return Err(RecordError::not_found("abonne", id));
    }

    get_abonne(conn, &AccessScope::All, id)
}

/// Deletes a subscriber. Spouses, children and documents go with it.
pub fn delete_abonne(
    conn: &Connection,
    scope: &AccessScope,
    id: i64,
) -> Result<DeletedAbonne, RecordError> {
    let abonne = get_abonne(conn, scope, id)?;
    let documents = documents::list_documents(conn, &abonne)?;

    let count = conn.execute("DELETE FROM abonnes WHERE id = ?1", [id])?;
    if count == 0 {
        return Err(RecordError::not_found("abonne", id));
    }

    Ok(DeletedAbonne { abonne, documents })
}
