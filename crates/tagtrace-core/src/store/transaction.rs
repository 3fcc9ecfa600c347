//! Scoped transactions over a pooled connection.
//!
//! `BEGIN` before the closure, `COMMIT` when it returns `Ok`, `ROLLBACK` when
//! it returns `Err`. A failed rollback is logged and otherwise ignored; the
//! closure's error is what the caller sees. Validation errors raised inside a
//! transaction surface as [`StoreError::TransactionFailed`]; every other kind
//! propagates unchanged.
//!
//! If the connection is already inside a transaction the closure simply runs
//! as part of it, so store methods compose.

use rusqlite::Connection;
use tracing::{debug, warn};

use super::StoreError;

/// Run `f` inside a transaction on `conn`.
pub fn run_in_transaction<T, F>(conn: &Connection, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&Connection) -> Result<T, StoreError>,
{
    if !conn.is_autocommit() {
        return f(conn);
    }

    conn.execute_batch("BEGIN IMMEDIATE")?;

    match f(conn) {
        Ok(value) => match conn.execute_batch("COMMIT") {
            Ok(()) => Ok(value),
            Err(commit_err) => {
                rollback_quietly(conn);
                Err(StoreError::Sqlite(commit_err))
            }
        },
        Err(err) => {
            rollback_quietly(conn);
            Err(into_transaction_error(err))
        }
    }
}

fn rollback_quietly(conn: &Connection) {
    if conn.is_autocommit() {
        return;
    }
    match conn.execute_batch("ROLLBACK") {
        Ok(()) => debug!("Transaction rolled back"),
        Err(e) => warn!(error = %e, "Rollback failed; ignoring"),
    }
}

fn into_transaction_error(err: StoreError) -> StoreError {
    match err {
        StoreError::Validation(msg) => StoreError::TransactionFailed(msg),
        other => other,
    }
}
