//! Row types and CRUD operations.
//!
//! Two insert paths exist and stay separate: [`insert_tag`] is strict and
//! fails on the first invalid field, [`bulk_insert_tags`] is permissive and
//! records invalid rows instead of failing.

use std::collections::{BTreeSet, HashMap, HashSet};

use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::schema::{REFERENCE_COLUMNS, TAG_COLUMNS};
use super::{get_metadata, Result, StoreError};
use crate::tags::{format_tag_key, is_storage_category};

/// Reference type used when none is given.
pub const DEFAULT_REFERENCE_TYPE: &str = "chain";

/// A stored tag row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTag {
    pub id: i64,
    pub category: String,
    pub identifier: String,
    pub description: Option<String>,
    pub file_path: String,
    pub line_number: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl StoredTag {
    pub fn key(&self) -> String {
        format_tag_key(&self.category, &self.identifier)
    }
}

/// A stored reference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReference {
    pub id: i64,
    pub source_tag_id: i64,
    pub target_tag_id: i64,
    pub reference_type: String,
    pub created_at: String,
}

/// Input row for bulk inserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTag {
    pub category: String,
    pub identifier: String,
    pub description: Option<String>,
    pub file_path: String,
    pub line_number: u32,
}

impl NewTag {
    pub fn new(
        category: impl Into<String>,
        identifier: impl Into<String>,
        file_path: impl Into<String>,
        line_number: u32,
    ) -> Self {
        Self {
            category: category.into(),
            identifier: identifier.into(),
            description: None,
            file_path: file_path.into(),
            line_number,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Outcome of a permissive bulk insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkInsertReport {
    /// Row ids in input order, skipped rows excluded.
    pub inserted_ids: Vec<i64>,
    /// `(input index, reason)` for rows that were not inserted.
    pub skipped: Vec<(usize, String)>,
}

impl BulkInsertReport {
    pub fn inserted(&self) -> usize {
        self.inserted_ids.len()
    }
}

/// Partial update. Only these fields can be patched.
///
/// For `description`, `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPatch {
    pub category: Option<String>,
    pub identifier: Option<String>,
    pub description: Option<Option<String>>,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
}

impl TagPatch {
    /// Build a patch from a JSON object. Unknown keys and values of the wrong
    /// type are ignored.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        let text = |key: &str| obj.get(key).and_then(|v| v.as_str()).map(str::to_string);

        Self {
            category: text("category"),
            identifier: text("identifier"),
            description: match obj.get("description") {
                Some(serde_json::Value::Null) => Some(None),
                Some(serde_json::Value::String(s)) => Some(Some(s.clone())),
                _ => None,
            },
            file_path: text("file_path"),
            line_number: obj
                .get("line_number")
                .and_then(|v| v.as_u64())
                .and_then(|n| u32::try_from(n).ok()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.identifier.is_none()
            && self.description.is_none()
            && self.file_path.is_none()
            && self.line_number.is_none()
    }
}

/// Counts describing the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub tag_count: usize,
    pub reference_count: usize,
    pub distinct_keys: usize,
    pub file_count: usize,
    pub schema_version: Option<String>,
}

fn validate_fields(category: &str, identifier: &str) -> Result<()> {
    if !is_storage_category(category) {
        return Err(StoreError::validation(format!(
            "invalid category '{category}'"
        )));
    }
    if identifier.trim().is_empty() {
        return Err(StoreError::validation("identifier must not be empty"));
    }
    Ok(())
}

fn row_to_tag(row: &Row<'_>) -> SqliteResult<StoredTag> {
    let line: i64 = row.get(5)?;
    Ok(StoredTag {
        id: row.get(0)?,
        category: row.get(1)?,
        identifier: row.get(2)?,
        description: row.get(3)?,
        file_path: row.get(4)?,
        line_number: line.max(0) as u32,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_reference(row: &Row<'_>) -> SqliteResult<StoredReference> {
    Ok(StoredReference {
        id: row.get(0)?,
        source_tag_id: row.get(1)?,
        target_tag_id: row.get(2)?,
        reference_type: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Run a tag `SELECT` with the standard column list.
///
/// `tail` is appended after `FROM tags`.
pub(crate) fn query_tags<P: rusqlite::Params>(
    conn: &Connection,
    tail: &str,
    params: P,
) -> Result<Vec<StoredTag>> {
    let sql = format!("SELECT {TAG_COLUMNS} FROM tags {tail}");
    let mut stmt = conn.prepare(&sql)?;
    let tags = stmt
        .query_map(params, row_to_tag)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(tags)
}

fn query_references<P: rusqlite::Params>(
    conn: &Connection,
    tail: &str,
    params: P,
) -> Result<Vec<StoredReference>> {
    let sql = format!("SELECT {REFERENCE_COLUMNS} FROM tag_references {tail}");
    let mut stmt = conn.prepare(&sql)?;
    let refs = stmt
        .query_map(params, row_to_reference)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(refs)
}

// =========================================================================
// Tag Operations
// =========================================================================

/// Insert one tag.
///
/// Fails with [`StoreError::Validation`] if the category is outside the
/// storage taxonomy or the identifier is empty. No deduplication is done.
pub fn insert_tag(
    conn: &Connection,
    category: &str,
    identifier: &str,
    description: Option<&str>,
    file_path: &str,
    line_number: u32,
) -> Result<i64> {
    validate_fields(category, identifier)?;
    conn.execute(
        r#"
        INSERT INTO tags (category, identifier, description, file_path, line_number)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![category, identifier, description, file_path, line_number as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert many tags, skipping invalid rows.
///
/// The caller owns the transaction; [`super::TagStore::bulk_insert_tags`]
/// wraps this in one.
pub fn bulk_insert_tags(conn: &Connection, rows: &[NewTag]) -> Result<BulkInsertReport> {
    let mut report = BulkInsertReport::default();
    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO tags (category, identifier, description, file_path, line_number)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )?;

    for (idx, row) in rows.iter().enumerate() {
        if let Err(e) = validate_fields(&row.category, &row.identifier) {
            report.skipped.push((idx, e.to_string()));
            continue;
        }
        match stmt.execute(params![
            row.category,
            row.identifier,
            row.description,
            row.file_path,
            row.line_number as i64,
        ]) {
            Ok(_) => report.inserted_ids.push(conn.last_insert_rowid()),
            Err(e) => report.skipped.push((idx, e.to_string())),
        }
    }

    if !report.skipped.is_empty() {
        debug!(
            inserted = report.inserted(),
            skipped = report.skipped.len(),
            "Bulk insert skipped rows"
        );
    }
    Ok(report)
}

/// Apply a patch. Returns false if the row does not exist or the patch is empty.
pub fn update_tag(conn: &Connection, id: i64, patch: &TagPatch) -> Result<bool> {
    if patch.is_empty() {
        return Ok(false);
    }
    let Some(current) = get_tag_by_id(conn, id)? else {
        return Ok(false);
    };

    let category = patch.category.as_deref().unwrap_or(&current.category);
    let identifier = patch.identifier.as_deref().unwrap_or(&current.identifier);
    validate_fields(category, identifier)?;

    let description = match &patch.description {
        Some(d) => d.as_deref(),
        None => current.description.as_deref(),
    };
    let file_path = patch.file_path.as_deref().unwrap_or(&current.file_path);
    let line_number = patch.line_number.unwrap_or(current.line_number);

    let updated = conn.execute(
        r#"
        UPDATE tags
        SET category = ?1, identifier = ?2, description = ?3, file_path = ?4, line_number = ?5
        WHERE id = ?6
        "#,
        params![category, identifier, description, file_path, line_number as i64, id],
    )?;
    Ok(updated > 0)
}

pub fn delete_tag(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM tags WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

pub fn get_tag_by_id(conn: &Connection, id: i64) -> Result<Option<StoredTag>> {
    let sql = format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?1");
    let tag = conn.query_row(&sql, [id], row_to_tag).optional()?;
    Ok(tag)
}

pub fn get_all_tags(conn: &Connection) -> Result<Vec<StoredTag>> {
    query_tags(conn, "ORDER BY id", [])
}

pub fn get_tags_by_file(conn: &Connection, file_path: &str) -> Result<Vec<StoredTag>> {
    query_tags(conn, "WHERE file_path = ?1 ORDER BY line_number, id", [file_path])
}

/// Delete every row recorded for a file. References go with them.
pub fn delete_tags_by_file(conn: &Connection, file_path: &str) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM tags WHERE file_path = ?1", [file_path])?;
    Ok(deleted)
}

pub fn tag_keys(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT category, identifier FROM tags")?;
    let keys = stmt
        .query_map([], |row| {
            let cat: String = row.get(0)?;
            let id: String = row.get(1)?;
            Ok(format_tag_key(&cat, &id))
        })?
        .collect::<SqliteResult<BTreeSet<_>>>()?;
    Ok(keys)
}

pub fn first_ids_by_key(conn: &Connection) -> Result<HashMap<String, i64>> {
    let mut stmt =
        conn.prepare("SELECT category, identifier, MIN(id) FROM tags GROUP BY category, identifier")?;
    let map = stmt
        .query_map([], |row| {
            let cat: String = row.get(0)?;
            let id: String = row.get(1)?;
            Ok((format_tag_key(&cat, &id), row.get::<_, i64>(2)?))
        })?
        .collect::<SqliteResult<HashMap<_, _>>>()?;
    Ok(map)
}

/// Rows matching a tag key, oldest first.
pub fn find_by_key(conn: &Connection, category: &str, identifier: &str) -> Result<Vec<StoredTag>> {
    query_tags(
        conn,
        "WHERE category = ?1 AND identifier = ?2 ORDER BY created_at, id",
        params![category, identifier],
    )
}

pub fn count_tags(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
    Ok(count as usize)
}

// =========================================================================
// Reference Operations
// =========================================================================

/// Create a directed reference. Both endpoints must exist.
pub fn create_reference(
    conn: &Connection,
    source_tag_id: i64,
    target_tag_id: i64,
    reference_type: Option<&str>,
) -> Result<i64> {
    for id in [source_tag_id, target_tag_id] {
        if get_tag_by_id(conn, id)?.is_none() {
            return Err(StoreError::not_found(format!("tag {id}")));
        }
    }
    conn.execute(
        r#"
        INSERT INTO tag_references (source_tag_id, target_tag_id, reference_type)
        VALUES (?1, ?2, ?3)
        "#,
        params![
            source_tag_id,
            target_tag_id,
            reference_type.unwrap_or(DEFAULT_REFERENCE_TYPE)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_references_by_source(conn: &Connection, source_tag_id: i64) -> Result<Vec<StoredReference>> {
    query_references(conn, "WHERE source_tag_id = ?1 ORDER BY id", [source_tag_id])
}

pub fn get_references_by_target(conn: &Connection, target_tag_id: i64) -> Result<Vec<StoredReference>> {
    query_references(conn, "WHERE target_tag_id = ?1 ORDER BY id", [target_tag_id])
}

pub fn get_all_references(conn: &Connection) -> Result<Vec<StoredReference>> {
    query_references(conn, "ORDER BY id", [])
}

/// Existing `(source, target)` id pairs.
pub fn reference_pairs(conn: &Connection) -> Result<HashSet<(i64, i64)>> {
    let mut stmt = conn.prepare("SELECT source_tag_id, target_tag_id FROM tag_references")?;
    let pairs = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<SqliteResult<HashSet<_>>>()?;
    Ok(pairs)
}

pub fn count_references(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM tag_references", [], |row| row.get(0))?;
    Ok(count as usize)
}

// =========================================================================
// Bulk Operations
// =========================================================================

/// Delete all tags and references.
pub fn clear(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM tag_references", [])?;
    conn.execute("DELETE FROM tags", [])?;
    Ok(())
}

pub fn stats(conn: &Connection) -> Result<StoreStats> {
    let distinct: i64 = conn.query_row(
        "SELECT COUNT(*) FROM (SELECT DISTINCT category, identifier FROM tags)",
        [],
        |row| row.get(0),
    )?;
    let files: i64 = conn.query_row("SELECT COUNT(DISTINCT file_path) FROM tags", [], |row| {
        row.get(0)
    })?;

    Ok(StoreStats {
        tag_count: count_tags(conn)?,
        reference_count: count_references(conn)?,
        distinct_keys: distinct as usize,
        file_count: files as usize,
        schema_version: get_metadata(conn, "schema_version")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TagStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store() -> TagStore {
        TagStore::in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let store = store();
        let id = store
            .insert_tag("REQ", "AUTH-001", Some("Login"), "src/auth.rs", 12)
            .unwrap();
        let tag = store.get_tag_by_id(id).unwrap().unwrap();
        assert_eq!(tag.key(), "REQ:AUTH-001");
        assert_eq!(tag.description.as_deref(), Some("Login"));
        assert_eq!(tag.line_number, 12);
        assert!(!tag.created_at.is_empty());
    }

    #[test]
    fn test_insert_is_strict() {
        let store = store();
        let err = store.insert_tag("NOPE", "A1", None, "a", 1).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let err = store.insert_tag("REQ", "  ", None, "a", 1).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        // CUSTOM is a storage-only category
        assert!(store.insert_tag("CUSTOM", "X1", None, "a", 1).is_ok());
    }

    #[test]
    fn test_insert_allows_duplicate_keys() {
        let store = store();
        store.insert_tag("REQ", "A1", None, "a.md", 1).unwrap();
        store.insert_tag("REQ", "A1", None, "b.md", 4).unwrap();
        assert_eq!(store.count_tags().unwrap(), 2);
        assert_eq!(store.tag_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_bulk_insert_is_permissive() {
        let store = store();
        let rows = vec![
            NewTag::new("REQ", "A1", "a.md", 1),
            NewTag::new("BAD", "A2", "a.md", 2),
            NewTag::new("TEST", "", "a.md", 3),
            NewTag::new("TEST", "A1", "t.rs", 9).with_description("covers A1"),
        ];
        let report = store.bulk_insert_tags(&rows).unwrap();
        assert_eq!(report.inserted(), 2);
        assert_eq!(
            report.skipped.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(store.count_tags().unwrap(), 2);
    }

    #[test]
    fn test_update_whitelist() {
        let store = store();
        let id = store.insert_tag("REQ", "A1", Some("old"), "a.md", 1).unwrap();
        let patch = TagPatch::from_json(&json!({
            "description": "new",
            "line_number": 42,
            "id": 999,
            "created_at": "1970-01-01",
            "color": "red"
        }));
        assert!(store.update_tag(id, &patch).unwrap());

        let tag = store.get_tag_by_id(id).unwrap().unwrap();
        assert_eq!(tag.id, id);
        assert_eq!(tag.description.as_deref(), Some("new"));
        assert_eq!(tag.line_number, 42);
        assert_ne!(tag.created_at, "1970-01-01");
    }

    #[test]
    fn test_update_clears_description_and_validates() {
        let store = store();
        let id = store.insert_tag("REQ", "A1", Some("old"), "a.md", 1).unwrap();
        let clear = TagPatch::from_json(&json!({ "description": null }));
        assert!(store.update_tag(id, &clear).unwrap());
        assert_eq!(store.get_tag_by_id(id).unwrap().unwrap().description, None);

        let bad = TagPatch {
            category: Some("NOPE".into()),
            ..Default::default()
        };
        assert!(store.update_tag(id, &bad).is_err());
        assert!(!store.update_tag(id + 100, &clear).unwrap());
        assert!(!store.update_tag(id, &TagPatch::default()).unwrap());
    }

    #[test]
    fn test_references_and_cascade() {
        let store = store();
        let req = store.insert_tag("REQ", "A1", None, "a.md", 1).unwrap();
        let design = store.insert_tag("DESIGN", "A1", None, "d.md", 1).unwrap();
        let r = store.create_reference(req, design, None).unwrap();

        let out = store.get_references_by_source(req).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, r);
        assert_eq!(out[0].reference_type, DEFAULT_REFERENCE_TYPE);
        assert_eq!(store.get_references_by_target(design).unwrap().len(), 1);

        assert!(store.delete_tag(design).unwrap());
        assert_eq!(store.count_references().unwrap(), 0);
    }

    #[test]
    fn test_reference_to_missing_tag() {
        let store = store();
        let req = store.insert_tag("REQ", "A1", None, "a.md", 1).unwrap();
        let err = store.create_reference(req, 777, Some("link")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_self_reference_is_storable() {
        let store = store();
        let req = store.insert_tag("REQ", "A1", None, "a.md", 1).unwrap();
        store.create_reference(req, req, None).unwrap();
        assert!(store.reference_pairs().unwrap().contains(&(req, req)));
    }

    #[test]
    fn test_file_operations_and_stats() {
        let store = store();
        store.insert_tag("REQ", "A1", None, "a.md", 5).unwrap();
        store.insert_tag("REQ", "A2", None, "a.md", 2).unwrap();
        store.insert_tag("TEST", "A1", None, "t.rs", 1).unwrap();

        let in_a: Vec<u32> = store
            .get_tags_by_file("a.md")
            .unwrap()
            .iter()
            .map(|t| t.line_number)
            .collect();
        assert_eq!(in_a, vec![2, 5]);

        let stats = store.stats().unwrap();
        assert_eq!(stats.tag_count, 3);
        assert_eq!(stats.distinct_keys, 3);
        assert_eq!(stats.file_count, 2);

        assert_eq!(store.delete_tags_by_file("a.md").unwrap(), 2);
        assert_eq!(store.count_tags().unwrap(), 1);

        store.clear().unwrap();
        assert_eq!(store.count_tags().unwrap(), 0);
    }

    #[test]
    fn test_first_ids_by_key() {
        let store = store();
        let first = store.insert_tag("REQ", "A1", None, "a.md", 1).unwrap();
        store.insert_tag("REQ", "A1", None, "b.md", 1).unwrap();
        let map = store.first_ids_by_key().unwrap();
        assert_eq!(map.get("REQ:A1"), Some(&first));
    }
}
