//! Opening the Omnidoc database.

use crate::migrations::{run_migrations, MigrationError};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Value of `database.path` that selects a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Connection tunables read from `[database]` in the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    pub busy_timeout_ms: u64,
    /// Upper bound of the pool. Zero is treated as one.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// The shared SQLite pool handed to request handlers.
pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("cannot create database directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    File(PathBuf),
    /// Every pooled connection to `:memory:` would see its own empty
    /// database, so this location always gets a single-connection pool.
    Memory,
}

impl DbLocation {
    pub fn parse(path: &str) -> Self {
        if path.trim() == MEMORY_PATH {
            Self::Memory
        } else {
            Self::File(PathBuf::from(path))
        }
    }
}

fn configure(conn: &mut Connection, busy_timeout_ms: u64, wal: bool) -> rusqlite::Result<()> {
    if wal {
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("database refused WAL journal mode ({})", mode)),
            ));
        }
    }
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.pragma_update(
        None,
        "busy_timeout",
        i64::try_from(busy_timeout_ms).unwrap_or(i64::MAX),
    )?;
    Ok(())
}

/// Builds a pool for `location` without touching the schema.
///
/// File databases run in WAL mode. Every connection enforces foreign keys,
/// which the subscriber cascades rely on.
pub fn create_pool(location: &DbLocation, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let timeout = settings.busy_timeout_ms;
    let (manager, builder) = match location {
        // Recycling the only connection would drop the database with it.
        DbLocation::Memory => (
            SqliteConnectionManager::memory().with_init(move |c| configure(c, timeout, false)),
            Pool::builder()
                .max_size(1)
                .idle_timeout(None)
                .max_lifetime(None),
        ),
        DbLocation::File(path) => {
            ensure_parent(path)?;
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
            (
                SqliteConnectionManager::file(path)
                    .with_flags(flags)
                    .with_init(move |c| configure(c, timeout, true)),
                Pool::builder().max_size(settings.pool_max_size.max(1)),
            )
        }
    };

    Ok(builder.build(manager)?)
}

fn ensure_parent(path: &Path) -> Result<(), PoolError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|source| PoolError::Directory {
                path: dir.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Opens the database at `path` and brings its schema up to date.
pub fn open_database(path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let location = DbLocation::parse(path);
    let pool = create_pool(&location, settings)?;
    let conn = pool.get()?;
    let applied = run_migrations(&conn)?;
    if applied > 0 {
        tracing::info!(count = applied, path, "applied database migrations");
    }
    drop(conn);
    Ok(pool)
}
