//! End-to-end migration tests: scan → flat index file → SQLite store → flat index.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use tagtrace_core::migration::{verify_migration, MigrationReporter};
use tagtrace_core::search::chain::DEFAULT_MAX_DEPTH;
use tagtrace_core::{
    BackupManager, Direction, FlatIndex, MigrationEngine, MigrationMode, MigrationOptions,
    SearchEngine, TagScanner, TagStore,
};

fn write_project(root: &Path) {
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(
        root.join("docs/requirements.md"),
        "@REQ:AUTH-001 Users can log in\n\
         @REQ:AUTH-001 → @DESIGN:AUTH-001 → @TASK:AUTH-001 → @TEST:AUTH-001\n\
         @REQ:PAY-002 Card payments\n",
    )
    .unwrap();
    fs::write(
        root.join("docs/design.md"),
        "@DESIGN:AUTH-001 Session tokens\n@TECH:CORE-01 Layered core\n",
    )
    .unwrap();
    fs::write(
        root.join("src/login.rs"),
        "// @TASK:AUTH-001 login handler\n// @TEST:AUTH-001\nfn login() {}\n",
    )
    .unwrap();
}

fn engine_options() -> MigrationOptions {
    MigrationOptions {
        create_backup: true,
        ..Default::default()
    }
}

#[test]
fn scan_import_export_roundtrip() {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("project");
    write_project(&project);

    let flat = TagScanner::default().scan(&project).unwrap().to_flat_index();
    let flat_path = dir.path().join("tags.json");
    flat.save(&flat_path).unwrap();

    let store = TagStore::open(&dir.path().join("tags.db")).unwrap();
    let engine = MigrationEngine::new(&store)
        .with_options(engine_options())
        .with_backups(BackupManager::new(dir.path().join("backups")))
        .with_reporter(MigrationReporter::new(dir.path().join("reports")));

    let result = engine.migrate_flat_to_relational(&flat_path, MigrationMode::Full);
    assert!(result.is_clean(), "{:?}", result.errors);
    assert_eq!(result.tags_migrated, 6);
    assert_eq!(result.references_migrated, 3);
    assert!(result.backup_created);
    assert!(result.report_path.as_ref().unwrap().is_file());

    let verification = verify_migration(&flat, &store).unwrap();
    assert!(verification.is_consistent());

    let chain = SearchEngine::new(&store)
        .get_traceability_chain("REQ:AUTH-001", Direction::Forward, DEFAULT_MAX_DEPTH)
        .unwrap();
    assert!(chain.found);
    assert_eq!(chain.node_count, 4);
    assert!(!chain.truncated);

    let out_path = dir.path().join("export/tags.json");
    let export = engine.migrate_relational_to_flat(&out_path);
    assert!(export.success, "{:?}", export.errors);

    let exported = FlatIndex::load(&out_path).unwrap();
    assert_eq!(exported.keys(), flat.keys());
    assert_eq!(exported.references, flat.references);
    assert_eq!(exported.statistics, flat.statistics);
    assert_eq!(
        exported.index["REQ:AUTH-001"][0].context,
        "@REQ:AUTH-001 Users can log in"
    );
}

#[test]
fn incremental_import_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("project");
    write_project(&project);
    let flat = TagScanner::default().scan(&project).unwrap().to_flat_index();
    let value = serde_json::to_value(&flat).unwrap();

    let store = TagStore::in_memory().unwrap();
    let engine = MigrationEngine::new(&store);

    let first = engine.import_value(&value, MigrationMode::Incremental);
    let before = store.stats().unwrap();
    let second = engine.import_value(&value, MigrationMode::Incremental);
    let after = store.stats().unwrap();

    assert_eq!(first.tags_migrated, 6);
    assert_eq!(second.tags_migrated, 0);
    assert_eq!(second.tags_preserved, 6);
    assert_eq!(second.references_migrated, 0);
    assert_eq!(before, after);
}

#[test]
fn strict_mode_rejects_bad_document_without_writing() {
    let store = TagStore::in_memory().unwrap();
    store.insert_tag("REQ", "KEEP-1", None, "a.md", 1).unwrap();

    let bad = json!({
        "version": "1.0",
        "index": {
            "REQ:A": [{"file": "a.md", "line": 1, "context": "@REQ:A"}],
            "NOPE:X1": [{"file": "a.md", "line": 2, "context": "@NOPE:X1"}]
        }
    });

    let result = MigrationEngine::new(&store)
        .with_options(MigrationOptions {
            strict: true,
            ..Default::default()
        })
        .import_value(&bad, MigrationMode::Full);

    assert!(!result.success);
    assert_eq!(result.validation_errors.len(), 2);
    assert_eq!(store.count_tags().unwrap(), 1);
}

#[test]
fn export_rollback_restores_previous_file() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("tags.json");
    fs::write(&out, b"{\"version\":\"1.0\",\"index\":{}}").unwrap();
    let original = fs::read(&out).unwrap();

    let store = TagStore::in_memory().unwrap();
    store.insert_tag("REQ", "A1", Some("first"), "a.md", 3).unwrap();

    let engine = MigrationEngine::new(&store)
        .with_options(engine_options())
        .with_backups(BackupManager::new(dir.path().join("backups")));

    let result = engine.migrate_relational_to_flat(&out);
    assert!(result.success);
    assert!(result.backup_created);
    assert_ne!(fs::read(&out).unwrap(), original);

    let restored = engine.rollback(&out).unwrap();
    assert_eq!(restored.size_bytes, original.len() as u64);
    assert_eq!(fs::read(&out).unwrap(), original);
}
