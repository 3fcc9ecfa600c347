//! Relational backend over [`TagStore`].

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use tracing::{debug, info, warn};

use tagtrace_core::migration::{build_flat_index, BackupManager, MigrationReporter};
use tagtrace_core::search::stats::DEFAULT_TOP_FILES;
use tagtrace_core::search::{Direction, IncompleteChain, TagQuery, TagStatistics};
use tagtrace_core::store::crud;
use tagtrace_core::store::{NewTag, StoreError};
use tagtrace_core::{
    FileTags, FlatIndex, MigrationEngine, MigrationMode, MigrationOptions, SearchEngine, TagStore,
};

use crate::error::BackendError;
use crate::traits::{FileReplacement, TagBackend};
use crate::types::{BackendKind, ChainResult, SearchFilters, TagInfo};

/// Backend that delegates to the storage, search and migration engines.
pub struct SqliteBackend {
    store: TagStore,
    options: MigrationOptions,
    backups: Option<BackupManager>,
    reporter: Option<MigrationReporter>,
}

impl SqliteBackend {
    /// Open (and initialize) the database. Failure here is the probe that
    /// sends the adapter to the flat fallback.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, BackendError> {
        let store = TagStore::open_with_timeout(path, busy_timeout)?;
        info!(path = %path.display(), "Relational backend opened");
        Ok(Self::from_store(store))
    }

    pub fn from_store(store: TagStore) -> Self {
        Self {
            store,
            options: MigrationOptions::default(),
            backups: None,
            reporter: None,
        }
    }

    pub fn with_migration(
        mut self,
        options: MigrationOptions,
        backups: Option<BackupManager>,
        reporter: Option<MigrationReporter>,
    ) -> Self {
        self.options = options;
        self.backups = backups;
        self.reporter = reporter;
        self
    }

    pub fn store(&self) -> &TagStore {
        &self.store
    }

    /// Migration engine configured with this backend's options.
    pub fn engine(&self) -> MigrationEngine<'_> {
        let mut engine = MigrationEngine::new(&self.store).with_options(self.options.clone());
        if let Some(backups) = &self.backups {
            engine = engine.with_backups(backups.clone());
        }
        if let Some(reporter) = &self.reporter {
            engine = engine.with_reporter(reporter.clone());
        }
        engine
    }

    pub fn search_advanced(&self, query: &TagQuery) -> Result<Vec<TagInfo>, BackendError> {
        let tags = SearchEngine::new(&self.store).search(query)?;
        Ok(tags.into_iter().map(TagInfo::from).collect())
    }

    pub fn incomplete_chains(&self) -> Result<Vec<IncompleteChain>, BackendError> {
        Ok(SearchEngine::new(&self.store).incomplete_primary_chains()?)
    }
}

impl TagBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn load_index(&self) -> Result<FlatIndex, BackendError> {
        Ok(build_flat_index(&self.store)?)
    }

    fn save_index(&self, index: &FlatIndex) -> Result<(), BackendError> {
        let value = serde_json::to_value(index)?;
        let result = self.engine().import_value(&value, MigrationMode::Full);

        if !result.success {
            return Err(BackendError::with_context(
                "saving index",
                result.errors.join("; "),
            ));
        }
        if !result.errors.is_empty() {
            warn!(
                errors = result.errors.len(),
                "Index saved with per-item errors"
            );
        }
        Ok(())
    }

    fn search_by_category(
        &self,
        category: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<TagInfo>, BackendError> {
        let mut query = TagQuery::new().category(category);
        if let Some(text) = &filters.identifier {
            query = query.identifier_contains(text.clone());
        }
        if let Some(text) = &filters.file {
            query = query.file_contains(text.clone());
        }
        if let Some(text) = &filters.description {
            query = query.description_contains(text.clone());
        }
        if let Some(limit) = filters.limit {
            query = query.limit(limit);
        }
        self.search_advanced(&query)
    }

    fn get_traceability_chain(
        &self,
        tag_key: &str,
        direction: Direction,
        max_depth: usize,
    ) -> Result<ChainResult, BackendError> {
        let chain =
            SearchEngine::new(&self.store).get_traceability_chain(tag_key, direction, max_depth)?;
        Ok(ChainResult::from_chain(chain))
    }

    fn replace_file(
        &self,
        path: &str,
        tags: Option<&FileTags>,
    ) -> Result<FileReplacement, BackendError> {
        let counts = self.store.transaction(|conn| {
            let mut counts = FileReplacement {
                removed: crud::delete_tags_by_file(conn, path)?,
                ..Default::default()
            };
            let Some(file) = tags else {
                return Ok(counts);
            };

            counts.inserted = insert_file_rows(conn, path, file)?;
            counts.references = link_files(conn, std::slice::from_ref(file))?;
            Ok(counts)
        })?;

        debug!(
            path,
            removed = counts.removed,
            inserted = counts.inserted,
            references = counts.references,
            "Replaced file tags"
        );
        Ok(counts)
    }

    fn replace_all(&self, files: &[FileTags]) -> Result<FileReplacement, BackendError> {
        let counts = self.store.transaction(|conn| {
            let mut counts = FileReplacement {
                removed: crud::count_tags(conn)?,
                ..Default::default()
            };
            crud::clear(conn)?;
            for file in files {
                counts.inserted += insert_file_rows(conn, &file.path, file)?;
            }
            counts.references = link_files(conn, files)?;
            Ok(counts)
        })?;

        debug!(
            files = files.len(),
            removed = counts.removed,
            inserted = counts.inserted,
            references = counts.references,
            "Replaced all tags"
        );
        Ok(counts)
    }

    fn statistics(&self) -> Result<TagStatistics, BackendError> {
        Ok(SearchEngine::new(&self.store).statistics(DEFAULT_TOP_FILES)?)
    }
}

/// One row per occurrence in `file`, recorded under `path`.
fn insert_file_rows(conn: &Connection, path: &str, file: &FileTags) -> Result<usize, StoreError> {
    let rows: Vec<NewTag> = file
        .tags
        .iter()
        .map(|(tag, pos)| {
            let row = NewTag::new(&tag.category, &tag.identifier, path, pos.line as u32);
            match &tag.description {
                Some(d) => row.with_description(d.clone()),
                None => row,
            }
        })
        .collect();
    Ok(crud::bulk_insert_tags(conn, &rows)?.inserted())
}

/// Create the chain links of `files` between the first row of each key,
/// skipping pairs that already exist.
fn link_files(conn: &Connection, files: &[FileTags]) -> Result<usize, StoreError> {
    let links: Vec<(String, String)> = files.iter().flat_map(FileTags::links).collect();
    if links.is_empty() {
        return Ok(0);
    }

    let ids = crud::first_ids_by_key(conn)?;
    let mut existing = crud::reference_pairs(conn)?;
    let mut created = 0;
    for (source, target) in links {
        let (Some(&src), Some(&dst)) = (ids.get(&source), ids.get(&target)) else {
            continue;
        };
        if existing.insert((src, dst)) {
            crud::create_reference(conn, src, dst, None)?;
            created += 1;
        }
    }
    Ok(created)
}
