//! Per-thread connection pool.
//!
//! Every thread gets its own `rusqlite::Connection`, created lazily on first
//! use and keyed by `ThreadId`. Connections are never handed to another
//! thread. The reentrant lock only exists so that nested store calls on the
//! owning thread (for example a CRUD call inside a transaction closure) can
//! reach the same connection.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, ReentrantMutex};
use rusqlite::Connection;
use tracing::debug;

use super::StoreError;

/// Default time a connection waits on a locked database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static MEMORY_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where the pool's connections point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// A database file on disk.
    File(PathBuf),
    /// A named shared-cache in-memory database.
    Memory(String),
}

impl StoreLocation {
    /// A fresh, uniquely named in-memory database.
    pub fn unique_memory() -> Self {
        let n = MEMORY_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
        StoreLocation::Memory(format!(
            "file:tagtrace-mem-{}-{n}?mode=memory&cache=shared",
            std::process::id()
        ))
    }

    /// Database file path, if on disk.
    pub fn path(&self) -> Option<&Path> {
        match self {
            StoreLocation::File(p) => Some(p),
            StoreLocation::Memory(_) => None,
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, StoreLocation::Memory(_))
    }
}

impl std::fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreLocation::File(p) => write!(f, "{}", p.display()),
            StoreLocation::Memory(uri) => write!(f, "{uri}"),
        }
    }
}

/// A thread's connection handle.
pub type PooledConnection = Arc<ReentrantMutex<Connection>>;

/// Connection-per-thread pool.
pub struct ConnectionPool {
    location: StoreLocation,
    busy_timeout: Duration,
    connections: DashMap<ThreadId, PooledConnection>,
    /// Keeps a shared-cache memory database alive while per-thread
    /// connections come and go.
    anchor: Option<Mutex<Connection>>,
}

impl ConnectionPool {
    /// Create a pool. For in-memory locations an anchor connection is opened
    /// immediately.
    pub fn new(location: StoreLocation, busy_timeout: Duration) -> Result<Self, StoreError> {
        let anchor = match &location {
            StoreLocation::Memory(_) => Some(Mutex::new(open_connection(&location, busy_timeout)?)),
            StoreLocation::File(_) => None,
        };

        Ok(Self {
            location,
            busy_timeout,
            connections: DashMap::new(),
            anchor,
        })
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// The calling thread's connection, opening it if needed.
    pub fn get(&self) -> Result<PooledConnection, StoreError> {
        let id = thread::current().id();
        if let Some(existing) = self.connections.get(&id) {
            return Ok(Arc::clone(existing.value()));
        }

        let conn = open_connection(&self.location, self.busy_timeout)?;
        debug!(thread = ?id, location = %self.location, "Opened pooled connection");
        let handle = Arc::new(ReentrantMutex::new(conn));
        self.connections.insert(id, Arc::clone(&handle));
        Ok(handle)
    }

    /// Drop the calling thread's connection.
    ///
    /// Worker threads should call this before exiting; otherwise their
    /// connection lives until the pool is dropped.
    pub fn release_current(&self) -> bool {
        self.connections.remove(&thread::current().id()).is_some()
    }

    /// Number of live per-thread connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn has_anchor(&self) -> bool {
        self.anchor.is_some()
    }
}

/// Open and configure one connection.
pub fn open_connection(
    location: &StoreLocation,
    busy_timeout: Duration,
) -> Result<Connection, StoreError> {
    let conn = match location {
        StoreLocation::File(path) => Connection::open(path)?,
        StoreLocation::Memory(uri) => Connection::open(uri)?,
    };
    configure_connection(&conn, location, busy_timeout)?;
    Ok(conn)
}

fn configure_connection(
    conn: &Connection,
    location: &StoreLocation,
    busy_timeout: Duration,
) -> rusqlite::Result<()> {
    // WAL lets readers proceed while a writer transaction is open
    if !location.is_memory() {
        conn.pragma_update(None, "journal_mode", "WAL")?;
    }
    // The index is rebuildable from sources; no fsync per commit
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_thread_reuses_connection() {
        let pool = ConnectionPool::new(StoreLocation::unique_memory(), DEFAULT_BUSY_TIMEOUT).unwrap();
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.connection_count(), 1);
        assert!(pool.has_anchor());
    }

    #[test]
    fn test_threads_get_distinct_connections() {
        let pool = Arc::new(
            ConnectionPool::new(StoreLocation::unique_memory(), DEFAULT_BUSY_TIMEOUT).unwrap(),
        );
        let main = pool.get().unwrap();

        let other = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.get().unwrap()).join().unwrap()
        };

        assert!(!Arc::ptr_eq(&main, &other));
        assert_eq!(pool.connection_count(), 2);
    }

    #[test]
    fn test_memory_database_shared_across_threads() {
        let pool = Arc::new(
            ConnectionPool::new(StoreLocation::unique_memory(), DEFAULT_BUSY_TIMEOUT).unwrap(),
        );
        {
            let conn = pool.get().unwrap();
            let conn = conn.lock();
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (42);")
                .unwrap();
        }

        let pool2 = Arc::clone(&pool);
        let value: i64 = thread::spawn(move || {
            let conn = pool2.get().unwrap();
            let conn = conn.lock();
            conn.query_row("SELECT x FROM t", [], |r| r.get(0)).unwrap()
        })
        .join()
        .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_release_current() {
        let pool = ConnectionPool::new(StoreLocation::unique_memory(), DEFAULT_BUSY_TIMEOUT).unwrap();
        pool.get().unwrap();
        assert!(pool.release_current());
        assert!(!pool.release_current());
        assert_eq!(pool.connection_count(), 0);
    }

    #[test]
    fn test_unique_memory_names() {
        assert_ne!(StoreLocation::unique_memory(), StoreLocation::unique_memory());
    }
}
