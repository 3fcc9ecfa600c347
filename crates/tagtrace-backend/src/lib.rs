//! tagtrace backend - compatibility layer over tag storage
//!
//! This crate provides a unified interface for:
//! - Category search and traceability chains
//! - Loading and saving the flat JSON index
//! - Incremental sync driven by file changes
//!
//! ## Backend Types
//!
//! - [`SqliteBackend`]: relational store with full search and chain traversal
//! - [`FlatFileBackend`]: JSON flat index, used when the store cannot be opened
//!
//! [`TagAdapter`] probes for the relational store once and keeps whichever
//! backend it found.
//!
//! ## Example
//!
//! ```ignore
//! use tagtrace_backend::{SearchFilters, TagAdapter};
//! use tagtrace_config::TraceConfig;
//!
//! let adapter = TagAdapter::open("/path/to/project", &TraceConfig::default())?;
//! adapter.rebuild()?;
//! let reqs = adapter.search_by_category("REQ", &SearchFilters::default())?;
//! ```

mod adapter;
mod error;
mod flat;
mod sqlite;
mod sync;
mod traits;
mod types;
mod watcher;

pub use adapter::{migration_options, scanner_from_config, ActiveBackend, TagAdapter};
pub use error::BackendError;
pub use flat::FlatFileBackend;
pub use sqlite::SqliteBackend;
pub use sync::IncrementalSync;
pub use traits::{FileReplacement, TagBackend};
pub use types::*;
pub use watcher::{classify, FileWatcher};

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;
