//! Reporting reads: dashboard statistics and the enriched subscriber report.

use crate::abonnes::{apply_filter, map_row_to_abonne, select_sql_with, AbonneFilter, STATUT_SQL};
use crate::query::Clauses;
use crate::{Abonne, AccessScope, RecordError};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// One group of a count breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub label: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildCount {
    pub id: i64,
    pub nom: String,
    pub prenom: String,
    pub nombre_enfants: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistiques {
    pub total_abonnes: i64,
    pub abonnes_par_ville: Vec<Bucket>,
    pub abonnes_par_statut: Vec<Bucket>,
    pub abonnes_par_agence: Vec<Bucket>,
    pub enfants_par_abonne: Vec<ChildCount>,
    pub abonnes_avec_conjoint: i64,
}

/// Report query parameters (`/rapports/abonnes`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RapportFilter {
    pub ville: Option<String>,
    #[serde(rename = "dateDebut")]
    pub date_debut: Option<String>,
    #[serde(rename = "dateFin")]
    pub date_fin: Option<String>,
    pub search: Option<String>,
}

/// A subscriber with counts of its dependents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RapportRow {
    #[serde(flatten)]
    pub abonne: Abonne,
    pub nombre_enfants: i64,
    pub nombre_conjoints: i64,
    pub nombre_documents: i64,
}

fn scoped(scope: &AccessScope) -> Clauses {
    let mut clauses = Clauses::new();
    scope.restrict(&mut clauses, "a.agence");
    clauses
}

fn buckets(conn: &Connection, scope: &AccessScope, expr: &str) -> Result<Vec<Bucket>, RecordError> {
    let clauses = scoped(scope);
    let sql = format!(
        "SELECT {expr} AS label, COUNT(*) FROM abonnes a{} GROUP BY label ORDER BY COUNT(*) DESC, label",
        clauses.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(clauses.params().as_slice(), |row| {
        Ok(Bucket {
            label: row.get(0)?,
            count: row.get(1)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Dashboard figures over the subscribers visible to `scope`.
pub fn statistiques(conn: &Connection, scope: &AccessScope) -> Result<Statistiques, RecordError> {
    let clauses = scoped(scope);
    let params = clauses.params();

    let total_abonnes: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM abonnes a{}", clauses.where_sql()),
        params.as_slice(),
        |row| row.get(0),
    )?;

    let abonnes_avec_conjoint: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(DISTINCT a.id) FROM abonnes a JOIN conjoints c ON c.abonne_id = a.id{}",
            clauses.where_sql()
        ),
        params.as_slice(),
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT a.id, a.nom, a.prenom, COUNT(e.id)
         FROM abonnes a LEFT JOIN enfants e ON e.abonne_id = a.id{}
         GROUP BY a.id ORDER BY COUNT(e.id) DESC, a.id",
        clauses.where_sql()
    ))?;
    let rows = stmt.query_map(params.as_slice(), |row| {
        Ok(ChildCount {
            id: row.get(0)?,
            nom: row.get(1)?,
            prenom: row.get(2)?,
            nombre_enfants: row.get(3)?,
        })
    })?;
    let mut enfants_par_abonne = Vec::new();
    for row in rows {
        enfants_par_abonne.push(row?);
    }

    Ok(Statistiques {
        total_abonnes,
        abonnes_par_ville: buckets(conn, scope, "a.ville")?,
        abonnes_par_statut: buckets(conn, scope, STATUT_SQL)?,
        abonnes_par_agence: buckets(conn, scope, "a.agence")?,
        enfants_par_abonne,
        abonnes_avec_conjoint,
    })
}

/// Subscribers matching the report filters, with dependent counts.
pub fn rapport_abonnes(
    conn: &Connection,
    scope: &AccessScope,
    filter: &RapportFilter,
) -> Result<Vec<RapportRow>, RecordError> {
    let filter = AbonneFilter {
        ville: filter.ville.clone(),
        date_debut: filter.date_debut.clone(),
        date_fin: filter.date_fin.clone(),
        search: filter.search.clone(),
        ..AbonneFilter::default()
    };
    let mut clauses = Clauses::new();
    apply_filter(&mut clauses, scope, &filter);

    let sql = format!(
        "{}{} ORDER BY a.date_debut DESC, a.id DESC",
        select_sql_with(
            ", (SELECT COUNT(*) FROM enfants e WHERE e.abonne_id = a.id),
               (SELECT COUNT(*) FROM conjoints c WHERE c.abonne_id = a.id),
               (SELECT COUNT(*) FROM documents d WHERE d.abonne_id = a.id)"
        ),
        clauses.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(clauses.params().as_slice(), |row| {
        Ok(RapportRow {
            abonne: map_row_to_abonne(row)?,
            nombre_enfants: row.get(17)?,
            nombre_conjoints: row.get(18)?,
            nombre_documents: row.get(19)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
