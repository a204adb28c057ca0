//! Transaction helper shared by every mutating service call.

use rusqlite::{Connection, Transaction};

/// Runs `f` inside a single transaction on `conn`.
///
/// The transaction commits only when `f` returns `Ok`. On error the
/// transaction is dropped, which rolls it back, so no partial state is ever
/// committed. The borrow on `conn` prevents a second transaction from being
/// opened on the same connection while this one is live.
pub fn with_transaction<T, E, F>(conn: &mut Connection, f: F) -> Result<T, E>
where
    E: From<rusqlite::Error>,
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
{
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}
