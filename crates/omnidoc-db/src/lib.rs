//! Persistence gateway for Omnidoc.
//!
//! Opens the SQLite database behind an `r2d2` pool, keeps its schema at the
//! latest `user_version` and provides the transaction helper. The crate owns
//! no business rules beyond the schema.

mod migrations;
mod pool;
mod transaction;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{
    create_pool, open_database, DbLocation, DbPool, DbRuntimeSettings, PoolError, MEMORY_PATH,
};
pub use transaction::with_transaction;
