//! Migration between the flat index and the relational store.
//!
//! Failure policy: problems with single items (an unreadable entry, a row the
//! store rejects, a reference whose endpoint is missing) are recorded in
//! `MigrationResult::errors` and the run continues. `success` is cleared only
//! when the run itself fails: I/O, JSON, the write transaction, or strict
//! validation. Callers that want all-or-nothing should check
//! [`MigrationResult::is_clean`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::backup::{BackupError, BackupInfo, BackupManager};
use super::flat::{
    description_from_context, format_context, FlatEntry, FlatIndex, FLAT_INDEX_VERSION,
};
use super::report::{MigrationReporter, PerformanceMetrics};
use super::validate::{FlatIndexValidator, ValidationError, DEFAULT_MIN_IDENTIFIER_LENGTH};
use crate::store::{crud, StoreError, TagStore};
use crate::tags::parse_tag_key;

/// Errors that abort a migration run
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("Strict validation failed with {count} error(s)")]
    StrictValidation { count: usize },

    #[error("Backups are disabled; nothing to roll back for {0}")]
    NoBackupManager(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDirection {
    FlatToRelational,
    RelationalToFlat,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlatToRelational => write!(f, "flat → relational"),
            Self::RelationalToFlat => write!(f, "relational → flat"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationMode {
    /// Clear the store, then import everything.
    #[default]
    Full,
    /// Import only keys the store does not have yet.
    Incremental,
}

impl std::str::FromStr for MigrationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            other => Err(format!("unknown migration mode: {other}")),
        }
    }
}

/// Stage reported to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStage {
    Parse,
    Tags,
    References,
    Export,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationProgress {
    pub stage: MigrationStage,
    pub processed: usize,
    pub total: usize,
}

/// Progress callback.
pub type ProgressFn = Box<dyn Fn(&MigrationProgress) + Send + Sync>;

/// Outcome of one migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub success: bool,
    pub direction: MigrationDirection,
    pub mode: MigrationMode,
    pub tags_migrated: usize,
    pub references_migrated: usize,
    /// Keys left untouched by an incremental import.
    pub tags_preserved: usize,
    /// References dropped because an endpoint did not resolve.
    pub references_skipped: usize,
    pub validation_errors: Vec<ValidationError>,
    pub errors: Vec<String>,
    pub backup: Option<BackupInfo>,
    pub backup_created: bool,
    pub rolled_back: bool,
    pub metrics: Option<PerformanceMetrics>,
    pub report_path: Option<PathBuf>,
}

impl MigrationResult {
    fn new(direction: MigrationDirection, mode: MigrationMode) -> Self {
        Self {
            success: true,
            direction,
            mode,
            tags_migrated: 0,
            references_migrated: 0,
            tags_preserved: 0,
            references_skipped: 0,
            validation_errors: Vec::new(),
            errors: Vec::new(),
            backup: None,
            backup_created: false,
            rolled_back: false,
            metrics: None,
            report_path: None,
        }
    }

    /// Succeeded with no per-item errors.
    pub fn is_clean(&self) -> bool {
        self.success && self.errors.is_empty() && self.validation_errors.is_empty()
    }
}

/// Engine options.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Validate the flat document and abort before writing on any error.
    pub strict: bool,
    pub create_backup: bool,
    /// Keys per progress report.
    pub batch_size: usize,
    pub min_identifier_length: usize,
    pub collect_metrics: bool,
    /// Backups kept per file after a run; `None` keeps all.
    pub keep_backups: Option<usize>,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            strict: false,
            create_backup: true,
            batch_size: 500,
            min_identifier_length: DEFAULT_MIN_IDENTIFIER_LENGTH,
            collect_metrics: true,
            keep_backups: None,
        }
    }
}

/// Runs migrations against one store.
pub struct MigrationEngine<'a> {
    store: &'a TagStore,
    options: MigrationOptions,
    backups: Option<BackupManager>,
    reporter: Option<MigrationReporter>,
    progress: Option<ProgressFn>,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(store: &'a TagStore) -> Self {
        Self {
            store,
            options: MigrationOptions::default(),
            backups: None,
            reporter: None,
            progress: None,
        }
    }

    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_backups(mut self, manager: BackupManager) -> Self {
        self.backups = Some(manager);
        self
    }

    pub fn with_reporter(mut self, reporter: MigrationReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    fn report_progress(&self, stage: MigrationStage, processed: usize, total: usize) {
        if let Some(cb) = &self.progress {
            cb(&MigrationProgress {
                stage,
                processed,
                total,
            });
        }
    }

    fn backup_if_enabled(
        &self,
        path: &Path,
        description: &str,
        result: &mut MigrationResult,
    ) -> Result<(), MigrationError> {
        if !self.options.create_backup || !path.is_file() {
            return Ok(());
        }
        let Some(manager) = &self.backups else {
            return Ok(());
        };
        let info = manager.create_backup(path, Some(description))?;
        if let Some(keep) = self.options.keep_backups {
            manager.prune(Some(path), keep.max(1))?;
        }
        result.backup = Some(info);
        result.backup_created = true;
        Ok(())
    }

    fn finish(
        &self,
        mut result: MigrationResult,
        started: Instant,
        outcome: Result<(), MigrationError>,
    ) -> MigrationResult {
        if let Err(e) = outcome {
            warn!(error = %e, direction = %result.direction, "Migration failed");
            result.success = false;
            result.errors.push(e.to_string());
        }

        if self.options.collect_metrics {
            result.metrics = Some(PerformanceMetrics::from_run(
                started.elapsed(),
                result.tags_migrated,
                result.references_migrated,
            ));
        }

        if let Some(reporter) = &self.reporter {
            match reporter.write_report(&result) {
                Ok(path) => result.report_path = Some(path),
                Err(e) => warn!(error = %e, "Could not write migration report"),
            }
        }

        info!(
            direction = %result.direction,
            success = result.success,
            tags = result.tags_migrated,
            references = result.references_migrated,
            preserved = result.tags_preserved,
            errors = result.errors.len(),
            "Migration finished"
        );
        self.report_progress(MigrationStage::Complete, result.tags_migrated, result.tags_migrated);
        result
    }

    // =========================================================================
    // Flat → Relational
    // =========================================================================

    /// Import a flat index file into the store.
    pub fn migrate_flat_to_relational(&self, flat_path: &Path, mode: MigrationMode) -> MigrationResult {
        let started = Instant::now();
        let mut result = MigrationResult::new(MigrationDirection::FlatToRelational, mode);
        let outcome = self.run_import(flat_path, mode, &mut result);
        self.finish(result, started, outcome)
    }

    /// Import an already-parsed JSON document.
    pub fn import_value(&self, value: &Value, mode: MigrationMode) -> MigrationResult {
        let started = Instant::now();
        let mut result = MigrationResult::new(MigrationDirection::FlatToRelational, mode);
        let outcome = self.import_document(value, mode, &mut result);
        self.finish(result, started, outcome)
    }

    fn run_import(
        &self,
        flat_path: &Path,
        mode: MigrationMode,
        result: &mut MigrationResult,
    ) -> Result<(), MigrationError> {
        info!(path = %flat_path.display(), ?mode, "Importing flat index");
        self.backup_if_enabled(flat_path, "pre-migration backup of flat index", result)?;

        let bytes = std::fs::read(flat_path)?;
        let value: Value = serde_json::from_slice(&bytes)?;
        self.import_document(&value, mode, result)
    }

    fn import_document(
        &self,
        value: &Value,
        mode: MigrationMode,
        result: &mut MigrationResult,
    ) -> Result<(), MigrationError> {
        if self.options.strict {
            let errors = FlatIndexValidator::new(self.options.min_identifier_length).validate(value);
            if !errors.is_empty() {
                let count = errors.len();
                result.validation_errors = errors;
                return Err(MigrationError::StrictValidation { count });
            }
        }

        let (flat, item_errors) = FlatIndex::from_value_lenient(value);
        result.errors.extend(item_errors);
        self.report_progress(MigrationStage::Parse, flat.index.len(), flat.index.len());

        self.store.transaction(|conn| {
            if mode == MigrationMode::Full {
                crud::clear(conn)?;
            }

            let mut key_to_id: HashMap<String, i64> = match mode {
                MigrationMode::Full => HashMap::new(),
                MigrationMode::Incremental => crud::first_ids_by_key(conn)?,
            };

            self.write_tags(conn, &flat, &mut key_to_id, result);
            self.write_references(conn, &flat, &key_to_id, mode, result)?;
            Ok(())
        })?;

        Ok(())
    }

    fn write_tags(
        &self,
        conn: &rusqlite::Connection,
        flat: &FlatIndex,
        key_to_id: &mut HashMap<String, i64>,
        result: &mut MigrationResult,
    ) {
        let total = flat.index.len();
        let batch = self.options.batch_size.max(1);

        for (i, (key, entries)) in flat.index.iter().enumerate() {
            if key_to_id.contains_key(key) {
                result.tags_preserved += 1;
            } else {
                match insert_first_entry(conn, key, entries) {
                    Ok(id) => {
                        key_to_id.insert(key.clone(), id);
                        result.tags_migrated += 1;
                    }
                    Err(e) => result.errors.push(format!("{key}: {e}")),
                }
            }

            if (i + 1) % batch == 0 || i + 1 == total {
                self.report_progress(MigrationStage::Tags, i + 1, total);
            }
        }
        debug!(migrated = result.tags_migrated, preserved = result.tags_preserved, "Tags written");
    }

    fn write_references(
        &self,
        conn: &rusqlite::Connection,
        flat: &FlatIndex,
        key_to_id: &HashMap<String, i64>,
        mode: MigrationMode,
        result: &mut MigrationResult,
    ) -> Result<(), StoreError> {
        let mut existing = match mode {
            MigrationMode::Full => Default::default(),
            MigrationMode::Incremental => crud::reference_pairs(conn)?,
        };

        let total = flat.references.len();
        let batch = self.options.batch_size.max(1);

        for (i, (source, targets)) in flat.references.iter().enumerate() {
            for target in targets {
                let (Some(&src), Some(&dst)) = (key_to_id.get(source), key_to_id.get(target)) else {
                    result.references_skipped += 1;
                    continue;
                };
                if !existing.insert((src, dst)) {
                    continue;
                }
                match crud::create_reference(conn, src, dst, None) {
                    Ok(_) => result.references_migrated += 1,
                    Err(e) => result.errors.push(format!("{source} -> {target}: {e}")),
                }
            }

            if (i + 1) % batch == 0 || i + 1 == total {
                self.report_progress(MigrationStage::References, i + 1, total);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Relational → Flat
    // =========================================================================

    /// Build the flat index from the store's current contents.
    pub fn build_flat_index(&self) -> Result<FlatIndex, StoreError> {
        build_flat_index(self.store)
    }

    /// Export the store to a flat index file.
    ///
    /// An existing output file is backed up first and restored if writing fails.
    pub fn migrate_relational_to_flat(&self, output_path: &Path) -> MigrationResult {
        let started = Instant::now();
        let mut result = MigrationResult::new(MigrationDirection::RelationalToFlat, MigrationMode::Full);
        let outcome = self.run_export(output_path, &mut result);

        if outcome.is_err() {
            if let (Some(manager), Some(info)) = (&self.backups, &result.backup) {
                match manager.restore(info) {
                    Ok(()) => result.rolled_back = true,
                    Err(e) => result.errors.push(format!("rollback failed: {e}")),
                }
            }
        }

        self.finish(result, started, outcome)
    }

    fn run_export(&self, output_path: &Path, result: &mut MigrationResult) -> Result<(), MigrationError> {
        info!(path = %output_path.display(), "Exporting flat index");
        self.backup_if_enabled(output_path, "pre-export backup of flat index", result)?;

        let flat = self.build_flat_index()?;
        self.report_progress(MigrationStage::Export, flat.index.len(), flat.index.len());

        result.tags_migrated = flat.statistics.total_tags;
        result.references_migrated = flat.reference_count();
        flat.save(output_path)?;
        Ok(())
    }

    /// Restore the newest backup of `path`.
    pub fn rollback(&self, path: &Path) -> Result<BackupInfo, MigrationError> {
        let manager = self
            .backups
            .as_ref()
            .ok_or_else(|| MigrationError::NoBackupManager(path.to_path_buf()))?;
        Ok(manager.rollback(path)?)
    }
}

fn insert_first_entry(
    conn: &rusqlite::Connection,
    key: &str,
    entries: &[FlatEntry],
) -> Result<i64, StoreError> {
    let parsed = parse_tag_key(key)
        .ok_or_else(|| StoreError::validation(format!("malformed tag key '{key}'")))?;
    let entry = entries
        .first()
        .ok_or_else(|| StoreError::validation("no entries"))?;
    let description = description_from_context(key, &entry.context);
    crud::insert_tag(
        conn,
        &parsed.category,
        &parsed.identifier,
        description.as_deref(),
        &entry.file,
        entry.line,
    )
}

/// Reconstruct the flat structure from stored rows.
pub fn build_flat_index(store: &TagStore) -> Result<FlatIndex, StoreError> {
    store.with_conn(|conn| {
        let tags = crud::get_all_tags(conn)?;
        let refs = crud::get_all_references(conn)?;

        let mut flat = FlatIndex::new();
        flat.version = FLAT_INDEX_VERSION.to_string();
        let mut id_to_key: HashMap<i64, String> = HashMap::with_capacity(tags.len());

        for tag in &tags {
            let key = tag.key();
            id_to_key.insert(tag.id, key.clone());
            flat.add_entry(
                key,
                FlatEntry {
                    file: tag.file_path.clone(),
                    line: tag.line_number,
                    context: format_context(&tag.category, &tag.identifier, tag.description.as_deref()),
                },
            );
        }

        let mut edges: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for r in &refs {
            if let (Some(src), Some(dst)) = (id_to_key.get(&r.source_tag_id), id_to_key.get(&r.target_tag_id)) {
                edges.entry(src.as_str()).or_default().insert(dst.as_str());
            }
        }
        flat.references = edges
            .into_iter()
            .map(|(src, dsts)| (src.to_string(), dsts.into_iter().map(str::to_string).collect()))
            .collect();

        flat.recompute_statistics();
        Ok(flat)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sample() -> Value {
        json!({
            "version": "1.0",
            "statistics": { "total_tags": 3, "categories": { "primary": 3 } },
            "index": {
                "REQ:AUTH-001": [
                    { "file": "docs/req.md", "line": 3, "context": "@REQ:AUTH-001 User login" },
                    { "file": "src/auth.rs", "line": 10, "context": "@REQ:AUTH-001" }
                ],
                "DESIGN:AUTH-001": [{ "file": "docs/design.md", "line": 1, "context": "@DESIGN:AUTH-001 Tokens" }],
                "TEST:AUTH-001": [{ "file": "tests/auth.rs", "line": 5, "context": "@TEST:AUTH-001" }]
            },
            "references": {
                "REQ:AUTH-001": ["DESIGN:AUTH-001", "TASK:MISSING"],
                "DESIGN:AUTH-001": ["TEST:AUTH-001"]
            }
        })
    }

    fn engine(store: &TagStore) -> MigrationEngine<'_> {
        MigrationEngine::new(store).with_options(MigrationOptions {
            create_backup: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_full_import() {
        let store = TagStore::in_memory().unwrap();
        let result = engine(&store).import_value(&sample(), MigrationMode::Full);

        assert!(result.success);
        assert!(result.is_clean());
        assert_eq!(result.tags_migrated, 3);
        assert_eq!(result.references_migrated, 2);
        assert_eq!(result.references_skipped, 1);
        assert_eq!(store.count_tags().unwrap(), 3);

        let req = &crate::search::SearchEngine::new(&store).by_key("REQ:AUTH-001").unwrap()[0];
        assert_eq!(req.description.as_deref(), Some("User login"));
        assert_eq!(req.file_path, "docs/req.md");
    }

    #[test]
    fn test_full_import_clears_first() {
        let store = TagStore::in_memory().unwrap();
        store.insert_tag("SEC", "OLD-1", None, "x", 1).unwrap();
        engine(&store).import_value(&sample(), MigrationMode::Full);
        assert!(!store.tag_keys().unwrap().contains("SEC:OLD-1"));
    }

    #[test]
    fn test_incremental_is_idempotent() {
        let store = TagStore::in_memory().unwrap();
        let first = engine(&store).import_value(&sample(), MigrationMode::Incremental);
        assert_eq!(first.tags_migrated, 3);

        let second = engine(&store).import_value(&sample(), MigrationMode::Incremental);
        assert!(second.success);
        assert_eq!(second.tags_migrated, 0);
        assert_eq!(second.tags_preserved, 3);
        assert_eq!(second.references_migrated, 0);
        assert_eq!(store.count_tags().unwrap(), 3);
        assert_eq!(store.count_references().unwrap(), 2);
    }

    #[test]
    fn test_per_item_errors_do_not_clear_success() {
        let store = TagStore::in_memory().unwrap();
        let doc = json!({
            "version": "1.0",
            "index": {
                "REQ:A1": [{ "file": "a", "line": 1, "context": "@REQ:A1" }],
                "BOGUS:A2": [{ "file": "a", "line": 2, "context": "" }],
                "NOCOLON": [{ "file": "a", "line": 3, "context": "" }],
                "TASK:A3": []
            }
        });
        let result = engine(&store).import_value(&doc, MigrationMode::Full);
        assert!(result.success);
        assert!(!result.is_clean());
        assert_eq!(result.tags_migrated, 1);
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_strict_mode_aborts_without_writes() {
        let store = TagStore::in_memory().unwrap();
        let engine = MigrationEngine::new(&store).with_options(MigrationOptions {
            strict: true,
            create_backup: false,
            ..Default::default()
        });
        let doc = json!({
            "index": { "REQ:A1": [{ "file": "a", "context": "" }] }
        });
        let result = engine.import_value(&doc, MigrationMode::Full);
        assert!(!result.success);
        assert!(result.validation_errors.len() >= 2);
        assert_eq!(store.count_tags().unwrap(), 0);
    }

    #[test]
    fn test_progress_callback_stages() {
        let store = TagStore::in_memory().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let engine = engine(&store).with_progress(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        engine.import_value(&sample(), MigrationMode::Full);
        // parse + tags + references + complete
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_export_builds_flat_structure() {
        let store = TagStore::in_memory().unwrap();
        engine(&store).import_value(&sample(), MigrationMode::Full);

        let flat = build_flat_index(&store).unwrap();
        assert_eq!(flat.statistics.total_tags, 3);
        assert_eq!(flat.statistics.categories.get("primary"), Some(&3));
        assert_eq!(
            flat.index["REQ:AUTH-001"][0].context,
            "@REQ:AUTH-001 User login"
        );
        assert_eq!(flat.references["REQ:AUTH-001"], vec!["DESIGN:AUTH-001"]);
    }

    #[test]
    fn test_rollback_requires_backups() {
        let store = TagStore::in_memory().unwrap();
        let err = engine(&store).rollback(Path::new("tags.json")).unwrap_err();
        assert!(matches!(err, MigrationError::NoBackupManager(_)));
    }
}
