//! SQLite Schema Definitions for Tag Storage
//!
//! Two data tables (`tags`, `tag_references`), one metadata table, four
//! indices and one trigger. This layout is the persisted contract for the
//! flat/relational round trip and should only change with a version bump.

/// Schema version stored in `store_metadata`.
pub const STORE_SCHEMA_VERSION: &str = "1.0";

/// Format of `created_at` / `updated_at` (millisecond precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// SQL to create the tags table
///
/// One row per tag occurrence. Several rows may share a
/// `(category, identifier)` key.
pub const SCHEMA_CREATE_TAGS: &str = r#"
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,

    -- Tag key
    category TEXT NOT NULL,
    identifier TEXT NOT NULL,

    description TEXT,

    -- Provenance
    file_path TEXT NOT NULL,
    line_number INTEGER NOT NULL DEFAULT 0,

    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
)
"#;

/// SQL to create the tag_references table
///
/// Directed edges between stored rows. Deleting either endpoint deletes the edge.
pub const SCHEMA_CREATE_REFERENCES: &str = r#"
CREATE TABLE IF NOT EXISTS tag_references (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    target_tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    reference_type TEXT NOT NULL DEFAULT 'chain',
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
)
"#;

/// SQL to create the metadata table
pub const SCHEMA_CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS store_metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)
"#;

/// SQL to create indexes
pub const SCHEMA_CREATE_INDEXES: &str = r#"
-- Tag key lookups (chain traversal, migration diffs)
CREATE INDEX IF NOT EXISTS idx_tags_category_identifier ON tags(category, identifier);

-- Per-file replace during incremental sync
CREATE INDEX IF NOT EXISTS idx_tags_file_path ON tags(file_path);

-- Outgoing / incoming edges
CREATE INDEX IF NOT EXISTS idx_references_source ON tag_references(source_tag_id);
CREATE INDEX IF NOT EXISTS idx_references_target ON tag_references(target_tag_id);
"#;

/// SQL to create the `updated_at` refresh trigger
///
/// The WHEN guard stops the trigger from overwriting an explicit
/// `updated_at` and from re-firing on its own update.
pub const SCHEMA_CREATE_TRIGGER: &str = r#"
CREATE TRIGGER IF NOT EXISTS update_tags_timestamp
AFTER UPDATE ON tags
FOR EACH ROW
WHEN NEW.updated_at = OLD.updated_at
BEGIN
    UPDATE tags
    SET updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
    WHERE id = NEW.id;
END
"#;

/// Column names for tag queries (in order for row mapping)
pub const TAG_COLUMNS: &str =
    "id, category, identifier, description, file_path, line_number, created_at, updated_at";

/// Column names for reference queries (in order for row mapping)
pub const REFERENCE_COLUMNS: &str =
    "id, source_tag_id, target_tag_id, reference_type, created_at";

/// Every DDL statement, in creation order.
pub fn create_statements() -> [&'static str; 5] {
    [
        SCHEMA_CREATE_TAGS,
        SCHEMA_CREATE_REFERENCES,
        SCHEMA_CREATE_METADATA,
        SCHEMA_CREATE_INDEXES,
        SCHEMA_CREATE_TRIGGER,
    ]
}
