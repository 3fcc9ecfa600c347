//! Read-only queries over a [`TagStore`].
//!
//! - basic lookups (this module)
//! - [`query`] - composite filters
//! - [`stats`] - counts and chain completeness
//! - [`chain`] - traceability traversal along stored references
//!
//! Unless noted otherwise results are ordered by `created_at, id`. File-scoped
//! lookups are ordered by line number.

pub mod chain;
pub mod query;
pub mod stats;

pub use chain::{ChainNode, ChainRelation, Direction, TraceabilityChain};
pub use query::TagQuery;
pub use stats::{FileCount, IncompleteChain, TagStatistics};

use rusqlite::params;

use crate::store::crud::{find_by_key, query_tags};
use crate::store::{Result, StoredTag, TagStore};
use crate::tags::parse_tag_key;

/// Query façade borrowing a store.
#[derive(Clone, Copy)]
pub struct SearchEngine<'a> {
    store: &'a TagStore,
}

impl<'a> SearchEngine<'a> {
    pub fn new(store: &'a TagStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'a TagStore {
        self.store
    }

    pub fn by_category(&self, category: &str) -> Result<Vec<StoredTag>> {
        self.store.with_conn(|conn| {
            query_tags(
                conn,
                "WHERE category = ?1 ORDER BY created_at, id",
                [category],
            )
        })
    }

    pub fn by_identifier(&self, identifier: &str) -> Result<Vec<StoredTag>> {
        self.store.with_conn(|conn| {
            query_tags(
                conn,
                "WHERE identifier = ?1 ORDER BY created_at, id",
                [identifier],
            )
        })
    }

    /// Rows for a `CATEGORY:IDENTIFIER` key. A malformed key matches nothing.
    pub fn by_key(&self, key: &str) -> Result<Vec<StoredTag>> {
        let Some(key) = parse_tag_key(key) else {
            return Ok(Vec::new());
        };
        self.store
            .with_conn(|conn| find_by_key(conn, &key.category, &key.identifier))
    }

    pub fn by_file(&self, file_path: &str) -> Result<Vec<StoredTag>> {
        self.store.with_conn(|conn| {
            query_tags(
                conn,
                "WHERE file_path = ?1 ORDER BY line_number, id",
                [file_path],
            )
        })
    }

    /// Substring match over identifier and description (ASCII case-insensitive).
    pub fn by_pattern(&self, text: &str) -> Result<Vec<StoredTag>> {
        let like = contains_pattern(text);
        self.store.with_conn(|conn| {
            query_tags(
                conn,
                r"WHERE identifier LIKE ?1 ESCAPE '\' OR description LIKE ?1 ESCAPE '\'
                  ORDER BY created_at, id",
                [like.as_str()],
            )
        })
    }

    /// Match file paths. Patterns with `*` or `?` are globs; anything else is
    /// a substring.
    pub fn by_file_pattern(&self, pattern: &str) -> Result<Vec<StoredTag>> {
        self.store.with_conn(|conn| {
            if pattern.contains(['*', '?']) {
                query_tags(
                    conn,
                    "WHERE file_path GLOB ?1 ORDER BY file_path, line_number, id",
                    [pattern],
                )
            } else {
                let like = contains_pattern(pattern);
                query_tags(
                    conn,
                    r"WHERE file_path LIKE ?1 ESCAPE '\' ORDER BY file_path, line_number, id",
                    [like.as_str()],
                )
            }
        })
    }

    /// Tags whose line lies in `start..=end`, optionally within one file.
    pub fn by_line_range(
        &self,
        start: u32,
        end: u32,
        file_path: Option<&str>,
    ) -> Result<Vec<StoredTag>> {
        self.store.with_conn(|conn| match file_path {
            Some(file) => query_tags(
                conn,
                "WHERE line_number BETWEEN ?1 AND ?2 AND file_path = ?3
                 ORDER BY line_number, id",
                params![start as i64, end as i64, file],
            ),
            None => query_tags(
                conn,
                "WHERE line_number BETWEEN ?1 AND ?2 ORDER BY created_at, id",
                params![start as i64, end as i64],
            ),
        })
    }
}

/// Escape LIKE wildcards using `\` as the escape character.
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub(crate) fn contains_pattern(text: &str) -> String {
    format!("%{}%", escape_like(text))
}
