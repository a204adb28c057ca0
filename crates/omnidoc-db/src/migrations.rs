//! Schema versioning.
//!
//! The schema version is SQLite's `user_version`: version `n` means the first
//! `n` scripts of [`SCHEMA`] have been applied. Each script runs in its own
//! transaction together with the version bump.

use rusqlite::Connection;
use thiserror::Error;

/// Schema scripts, oldest first. Only ever append.
const SCHEMA: &[(&str, &str)] = &[
    ("users", include_str!("migrations/000_users.sql")),
    ("abonnes", include_str!("migrations/001_abonnes.sql")),
    (
        "conjoints_enfants",
        include_str!("migrations/002_conjoints_enfants.sql"),
    ),
    ("documents", include_str!("migrations/003_documents.sql")),
];

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("schema step {version} ({label}) failed: {source}")]
    Step {
        version: usize,
        label: &'static str,
        source: rusqlite::Error,
    },

    #[error("cannot read schema version: {0}")]
    Version(rusqlite::Error),

    /// The file was written by a newer build.
    #[error("database schema version {found} is newer than this build ({known})")]
    TooNew { found: usize, known: usize },
}

/// Brings `conn` to the latest schema and returns how many steps ran.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply(conn, SCHEMA)
}

fn schema_version(conn: &Connection) -> Result<usize, MigrationError> {
    let version: i64 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(MigrationError::Version)?;
    Ok(usize::try_from(version).unwrap_or(0))
}

fn apply(conn: &Connection, steps: &[(&'static str, &'static str)]) -> Result<usize, MigrationError> {
    let current = schema_version(conn)?;
    if current > steps.len() {
        return Err(MigrationError::TooNew {
            found: current,
            known: steps.len(),
        });
    }

    for (index, &(label, sql)) in steps.iter().enumerate().skip(current) {
        let version = index + 1;
        let failed = |source| MigrationError::Step {
            version,
            label,
            source,
        };
        tracing::info!(version, step = label, "upgrading schema");

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(sql).map_err(failed)?;
        tx.pragma_update(None, "user_version", version as i64)
            .map_err(failed)?;
        tx.commit().map_err(failed)?;
    }

    Ok(steps.len() - current)
}
