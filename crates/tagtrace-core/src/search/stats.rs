//! Store-wide statistics.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::Result as SqliteResult;
use serde::Serialize;

use super::SearchEngine;
use crate::store::crud::{count_references, count_tags};
use crate::store::Result;
use crate::tags::PRIMARY_CHAIN;

/// Number of files listed in `top_files` by default.
pub const DEFAULT_TOP_FILES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCount {
    pub file_path: String,
    pub tag_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagStatistics {
    pub total_tags: usize,
    pub by_category: BTreeMap<String, usize>,
    pub total_references: usize,
    /// Files with the most tags, descending.
    pub top_files: Vec<FileCount>,
}

/// An identifier present in some Primary categories but not all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteChain {
    pub identifier: String,
    pub present: Vec<String>,
    pub missing: Vec<String>,
}

impl SearchEngine<'_> {
    pub fn statistics(&self, top_n: usize) -> Result<TagStatistics> {
        self.store().with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT category, COUNT(*) FROM tags GROUP BY category")?;
            let by_category = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
                })?
                .collect::<SqliteResult<BTreeMap<_, _>>>()?;

            let mut stmt = conn.prepare(
                "SELECT file_path, COUNT(*) AS n FROM tags
                 GROUP BY file_path ORDER BY n DESC, file_path LIMIT ?1",
            )?;
            let top_files = stmt
                .query_map([top_n as i64], |row| {
                    Ok(FileCount {
                        file_path: row.get(0)?,
                        tag_count: row.get::<_, i64>(1)? as usize,
                    })
                })?
                .collect::<SqliteResult<Vec<_>>>()?;

            Ok(TagStatistics {
                total_tags: count_tags(conn)?,
                by_category,
                total_references: count_references(conn)?,
                top_files,
            })
        })
    }

    /// Identifiers whose REQ/DESIGN/TASK/TEST set is partially filled.
    pub fn incomplete_primary_chains(&self) -> Result<Vec<IncompleteChain>> {
        let placeholders = PRIMARY_CHAIN
            .iter()
            .map(|c| format!("'{c}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT DISTINCT identifier, category FROM tags WHERE category IN ({placeholders})"
        );

        let present = self.store().with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (identifier, category) = row?;
                map.entry(identifier).or_default().insert(category);
            }
            Ok(map)
        })?;

        Ok(present
            .into_iter()
            .filter_map(|(identifier, cats)| {
                let (have, missing): (Vec<&str>, Vec<&str>) =
                    PRIMARY_CHAIN.iter().copied().partition(|c| cats.contains(*c));
                if missing.is_empty() {
                    return None;
                }
                Some(IncompleteChain {
                    identifier,
                    present: have.into_iter().map(String::from).collect(),
                    missing: missing.into_iter().map(String::from).collect(),
                })
            })
            .collect())
    }
}
