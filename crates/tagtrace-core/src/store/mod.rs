//! Relational tag store.
//!
//! SQLite-backed storage for tags and the references between them:
//!
//! - `schema` - DDL and schema version
//! - `pool` - one connection per thread
//! - `transaction` - scoped BEGIN/COMMIT/ROLLBACK
//! - `crud` - row types and the insert/update/delete/query functions
//!
//! CRUD functions take a plain `&Connection` so they compose inside
//! [`TagStore::transaction`]; [`TagStore`] exposes the same operations on
//! the calling thread's pooled connection.

pub mod crud;
pub mod pool;
pub mod schema;
pub mod transaction;

pub use crud::{
    BulkInsertReport, NewTag, StoreStats, StoredReference, StoredTag, TagPatch,
    DEFAULT_REFERENCE_TYPE,
};
pub use pool::{ConnectionPool, StoreLocation, DEFAULT_BUSY_TIMEOUT};
pub use schema::STORE_SCHEMA_VERSION;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: String, found: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// True for input problems, inside or outside a transaction.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::TransactionFailed(_))
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Handle to a tag database.
///
/// Cheap to share behind an `Arc`; each calling thread lazily gets its own
/// connection from the pool.
pub struct TagStore {
    pool: ConnectionPool,
}

impl TagStore {
    /// Open (or create) a database file and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            pool: ConnectionPool::new(StoreLocation::File(path.to_path_buf()), busy_timeout)?,
        };
        store.initialize()?;
        info!(path = %path.display(), "Opened tag store");
        Ok(store)
    }

    /// A private in-memory store, shared by all threads using this handle.
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            pool: ConnectionPool::new(StoreLocation::unique_memory(), DEFAULT_BUSY_TIMEOUT)?,
        };
        store.initialize()?;
        debug!(location = %store.location(), "Opened in-memory tag store");
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        self.with_conn(|conn| {
            for sql in schema::create_statements() {
                conn.execute_batch(sql)?;
            }
            match get_metadata(conn, "schema_version")? {
                Some(found) if found != STORE_SCHEMA_VERSION => {
                    Err(StoreError::SchemaVersionMismatch {
                        expected: STORE_SCHEMA_VERSION.to_string(),
                        found,
                    })
                }
                Some(_) => Ok(()),
                None => set_metadata(conn, "schema_version", STORE_SCHEMA_VERSION),
            }
        })
    }

    pub fn location(&self) -> &StoreLocation {
        self.pool.location()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Run `f` with the calling thread's connection.
    pub fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let handle = self.pool.get()?;
        let conn = handle.lock();
        f(&conn)
    }

    /// Run `f` inside a transaction on the calling thread's connection.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.with_conn(|conn| transaction::run_in_transaction(conn, f))
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| get_metadata(conn, key))
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| set_metadata(conn, key, value))
    }

    pub fn schema_version(&self) -> Result<Option<String>> {
        self.get_metadata("schema_version")
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// Strict single-row insert. See [`crud::insert_tag`].
    pub fn insert_tag(
        &self,
        category: &str,
        identifier: &str,
        description: Option<&str>,
        file_path: &str,
        line_number: u32,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            crud::insert_tag(conn, category, identifier, description, file_path, line_number)
        })
    }

    /// Permissive batch insert in one transaction. See [`crud::bulk_insert_tags`].
    pub fn bulk_insert_tags(&self, rows: &[NewTag]) -> Result<BulkInsertReport> {
        self.transaction(|conn| crud::bulk_insert_tags(conn, rows))
    }

    pub fn update_tag(&self, id: i64, patch: &TagPatch) -> Result<bool> {
        self.with_conn(|conn| crud::update_tag(conn, id, patch))
    }

    pub fn delete_tag(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| crud::delete_tag(conn, id))
    }

    pub fn get_tag_by_id(&self, id: i64) -> Result<Option<StoredTag>> {
        self.with_conn(|conn| crud::get_tag_by_id(conn, id))
    }

    pub fn get_all_tags(&self) -> Result<Vec<StoredTag>> {
        self.with_conn(crud::get_all_tags)
    }

    pub fn get_tags_by_file(&self, file_path: &str) -> Result<Vec<StoredTag>> {
        self.with_conn(|conn| crud::get_tags_by_file(conn, file_path))
    }

    pub fn delete_tags_by_file(&self, file_path: &str) -> Result<usize> {
        self.with_conn(|conn| crud::delete_tags_by_file(conn, file_path))
    }

    /// Distinct `CATEGORY:IDENTIFIER` keys.
    pub fn tag_keys(&self) -> Result<BTreeSet<String>> {
        self.with_conn(crud::tag_keys)
    }

    /// Lowest row id per key.
    pub fn first_ids_by_key(&self) -> Result<HashMap<String, i64>> {
        self.with_conn(crud::first_ids_by_key)
    }

    pub fn count_tags(&self) -> Result<usize> {
        self.with_conn(crud::count_tags)
    }

    // =========================================================================
    // References
    // =========================================================================

    pub fn create_reference(
        &self,
        source_tag_id: i64,
        target_tag_id: i64,
        reference_type: Option<&str>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            crud::create_reference(conn, source_tag_id, target_tag_id, reference_type)
        })
    }

    pub fn get_references_by_source(&self, source_tag_id: i64) -> Result<Vec<StoredReference>> {
        self.with_conn(|conn| crud::get_references_by_source(conn, source_tag_id))
    }

    pub fn get_references_by_target(&self, target_tag_id: i64) -> Result<Vec<StoredReference>> {
        self.with_conn(|conn| crud::get_references_by_target(conn, target_tag_id))
    }

    pub fn get_all_references(&self) -> Result<Vec<StoredReference>> {
        self.with_conn(crud::get_all_references)
    }

    pub fn reference_pairs(&self) -> Result<HashSet<(i64, i64)>> {
        self.with_conn(crud::reference_pairs)
    }

    pub fn count_references(&self) -> Result<usize> {
        self.with_conn(crud::count_references)
    }

    // =========================================================================
    // Bulk
    // =========================================================================

    /// Remove every tag and reference (keeps schema).
    pub fn clear(&self) -> Result<()> {
        self.transaction(crud::clear)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.with_conn(crud::stats)
    }
}

pub(crate) fn get_metadata(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM store_metadata WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub(crate) fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO store_metadata (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_has_schema_version() {
        let store = TagStore::in_memory().unwrap();
        assert_eq!(
            store.schema_version().unwrap().as_deref(),
            Some(STORE_SCHEMA_VERSION)
        );
        assert_eq!(store.count_tags().unwrap(), 0);
    }

    #[test]
    fn test_open_file_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("tags.db");
        {
            let store = TagStore::open(&path).unwrap();
            store.insert_tag("REQ", "A1", None, "a.md", 1).unwrap();
        }
        let store = TagStore::open(&path).unwrap();
        assert_eq!(store.count_tags().unwrap(), 1);
        assert_eq!(store.location().path(), Some(path.as_path()));
    }

    #[test]
    fn test_schema_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tags.db");
        {
            let store = TagStore::open(&path).unwrap();
            store.set_metadata("schema_version", "0.1").unwrap();
        }
        let err = TagStore::open(&path).err().unwrap();
        assert!(matches!(err, StoreError::SchemaVersionMismatch { .. }));
    }

    #[test]
    fn test_transaction_rolls_back_on_validation() {
        let store = TagStore::in_memory().unwrap();
        let err = store
            .transaction(|conn| {
                crud::insert_tag(conn, "REQ", "A1", None, "a.md", 1)?;
                crud::insert_tag(conn, "BOGUS", "A2", None, "a.md", 2)
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::TransactionFailed(_)));
        assert_eq!(store.count_tags().unwrap(), 0);
    }

    #[test]
    fn test_threads_see_same_memory_store() {
        let store = Arc::new(TagStore::in_memory().unwrap());
        store.insert_tag("REQ", "A1", None, "a.md", 1).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let n = store.count_tags().unwrap();
                    store.pool().release_current();
                    n
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), 1);
        }
    }
}
