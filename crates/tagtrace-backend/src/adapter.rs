//! Compatibility adapter.
//!
//! [`TagAdapter`] is what callers hold. It probes the relational store once at
//! construction and otherwise falls back to the flat JSON index; the chosen
//! variant never changes for the adapter's lifetime.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use tagtrace_config::{MigrationConfig, ScanConfig, TraceConfig};
use tagtrace_core::search::{Direction, TagQuery, TagStatistics};
use tagtrace_core::{
    analyze, AnalysisReport, BackupManager, ExclusionFilter, FlatIndex, MigrationOptions,
    MigrationReporter, TagScanner,
};

use crate::error::BackendError;
use crate::flat::FlatFileBackend;
use crate::sqlite::SqliteBackend;
use crate::sync::{canonical_root, IncrementalSync};
use crate::traits::TagBackend;
use crate::types::{
    BackendKind, ChainResult, FileEventKind, RebuildSummary, SearchFilters, SyncOutcome, TagInfo,
};
use crate::watcher::FileWatcher;
use crate::Result;

/// The backend selected at construction.
pub enum ActiveBackend {
    Relational(SqliteBackend),
    FlatFile(FlatFileBackend),
}

impl ActiveBackend {
    /// Open the relational store if possible, else the flat index.
    pub fn probe(config: &TraceConfig, root: &Path) -> Self {
        let db_path = config.database_path(root);
        let opened = std::fs::create_dir_all(config.data_dir(root))
            .map_err(BackendError::from)
            .and_then(|()| {
                SqliteBackend::open(
                    &db_path,
                    Duration::from_millis(config.storage.busy_timeout_ms),
                )
            });

        match opened {
            Ok(backend) => {
                let backups = config
                    .migration
                    .create_backup
                    .then(|| BackupManager::new(config.backup_dir(root)));
                let reporter = config
                    .migration
                    .write_reports
                    .then(|| MigrationReporter::new(config.reports_dir(root)));
                Self::Relational(backend.with_migration(
                    migration_options(&config.migration),
                    backups,
                    reporter,
                ))
            }
            Err(e) => {
                warn!(
                    path = %db_path.display(),
                    error = %e,
                    "Relational store unavailable, using flat index"
                );
                Self::FlatFile(FlatFileBackend::new(config.flat_index_path(root)))
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.as_dyn().kind()
    }

    pub fn as_dyn(&self) -> &dyn TagBackend {
        match self {
            Self::Relational(backend) => backend,
            Self::FlatFile(backend) => backend,
        }
    }
}

/// Engine options from the `[migration]` config table.
pub fn migration_options(config: &MigrationConfig) -> MigrationOptions {
    MigrationOptions {
        strict: config.strict,
        create_backup: config.create_backup,
        batch_size: config.batch_size,
        min_identifier_length: config.min_identifier_length,
        keep_backups: config.keep_backups,
        ..Default::default()
    }
}

/// Scanner from the `[scan]` config table.
pub fn scanner_from_config(config: &ScanConfig) -> TagScanner {
    TagScanner::new(
        ExclusionFilter::new(config.exclude_patterns.as_slice(), config.exclude_hidden),
        config.max_file_size_bytes(),
    )
}

struct SyncState {
    sync: IncrementalSync,
    watcher: Option<FileWatcher>,
}

struct Shared {
    root: PathBuf,
    backend: ActiveBackend,
    /// Read-side fallback when relational queries fail.
    fallback: FlatFileBackend,
    poll_interval: Duration,
    /// Guards event application and watcher start/stop.
    state: Mutex<SyncState>,
}

/// Handle over the active backend, incremental sync and file watcher.
/// Dropping it stops the watcher.
pub struct TagAdapter {
    shared: Arc<Shared>,
}

impl TagAdapter {
    /// Probe the backend for `root` and start watching if configured.
    pub fn open(root: impl AsRef<Path>, config: &TraceConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let backend = ActiveBackend::probe(config, &root);
        let adapter = Self::with_backend(&root, config, backend);
        if config.watch.enabled {
            adapter.start_watching()?;
        }
        Ok(adapter)
    }

    /// Build around an already chosen backend. Never starts the watcher.
    pub fn with_backend(root: &Path, config: &TraceConfig, backend: ActiveBackend) -> Self {
        let scanner = scanner_from_config(&config.scan);
        let root = canonical_root(root.to_path_buf());
        info!(root = %root.display(), backend = %backend.kind(), "Tag adapter ready");
        Self {
            shared: Arc::new(Shared {
                fallback: FlatFileBackend::new(config.flat_index_path(&root)),
                backend,
                poll_interval: Duration::from_millis(config.watch.poll_interval_ms),
                state: Mutex::new(SyncState {
                    sync: IncrementalSync::new(&root, scanner),
                    watcher: None,
                }),
                root,
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.shared.backend.kind()
    }

    /// The relational backend, when it is the active one.
    pub fn relational(&self) -> Option<&SqliteBackend> {
        match &self.shared.backend {
            ActiveBackend::Relational(backend) => Some(backend),
            ActiveBackend::FlatFile(_) => None,
        }
    }

    fn backend(&self) -> &dyn TagBackend {
        self.shared.backend.as_dyn()
    }

    pub fn load_index(&self) -> Result<FlatIndex> {
        self.backend().load_index()
    }

    pub fn save_index(&self, index: &FlatIndex) -> Result<()> {
        self.backend().save_index(index)
    }

    pub fn search_by_category(&self, category: &str, filters: &SearchFilters) -> Result<Vec<TagInfo>> {
        match self.backend().search_by_category(category, filters) {
            Err(e) if self.relational().is_some() && self.shared.fallback.exists() => {
                warn!(error = %e, category, "Relational search failed, reading flat index");
                self.shared.fallback.search_by_category(category, filters)
            }
            other => other,
        }
    }

    pub fn get_traceability_chain(
        &self,
        tag_key: &str,
        direction: Direction,
        max_depth: usize,
    ) -> Result<ChainResult> {
        match self.backend().get_traceability_chain(tag_key, direction, max_depth) {
            Err(e) if self.relational().is_some() => {
                warn!(error = %e, tag_key, "Chain traversal failed, returning degraded result");
                Ok(ChainResult::degraded(
                    tag_key,
                    direction,
                    max_depth,
                    None,
                    BackendKind::Relational,
                    e.to_string(),
                ))
            }
            other => other,
        }
    }

    /// Structured query; relational backend only.
    pub fn search_advanced(&self, query: &TagQuery) -> Result<Vec<TagInfo>> {
        self.relational()
            .ok_or_else(|| BackendError::relational_unavailable("search_advanced"))?
            .search_advanced(query)
    }

    pub fn statistics(&self) -> Result<TagStatistics> {
        self.backend().statistics()
    }

    /// Validator report over the current contents.
    pub fn analyze(&self) -> Result<AnalysisReport> {
        let tags = self.load_index()?.tag_graph();
        Ok(analyze(&tags))
    }

    /// Apply one file event under the sync lock.
    pub fn process_file_change(&self, path: &Path, kind: FileEventKind) -> Result<SyncOutcome> {
        let mut state = self.shared.state.lock();
        state.sync.apply(self.backend(), path, kind)
    }

    /// Scan the whole project and replace the backend contents.
    pub fn rebuild(&self) -> Result<RebuildSummary> {
        let mut state = self.shared.state.lock();
        let report = state.sync.scanner().scan(&self.shared.root)?;
        let counts = self.backend().replace_all(&report.files)?;
        state.sync.seed(&report);

        let summary = RebuildSummary {
            files_scanned: report.files_scanned,
            tagged_files: report.files.len(),
            tags: counts.inserted,
            keys: report.tag_graph().len(),
            references: counts.references,
        };
        info!(
            files = summary.files_scanned,
            keys = summary.keys,
            references = summary.references,
            "Rebuilt tag index"
        );
        Ok(summary)
    }

    pub fn is_watching(&self) -> bool {
        self.shared.state.lock().watcher.is_some()
    }

    /// Start the file watcher. Returns `false` if it was already running.
    pub fn start_watching(&self) -> Result<bool> {
        let mut state = self.shared.state.lock();
        if state.watcher.is_some() {
            return Ok(false);
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let on_exit = weak.clone();
        let watcher = FileWatcher::start(
            &self.shared.root,
            self.shared.poll_interval,
            move |path, kind| {
                if let Some(shared) = weak.upgrade() {
                    apply_event(&shared, &path, kind);
                }
            },
            move || {
                if let Some(shared) = on_exit.upgrade() {
                    release_thread_connection(&shared);
                }
            },
        )?;
        state.watcher = Some(watcher);
        Ok(true)
    }

    /// Stop the file watcher. Returns `false` if it was not running.
    pub fn stop_watching(&self) -> bool {
        // Release the lock before joining the consumer, which may be waiting on it
        let watcher = self.shared.state.lock().watcher.take();
        match watcher {
            Some(watcher) => {
                watcher.stop();
                info!("Stopped watching");
                true
            }
            None => false,
        }
    }
}

fn apply_event(shared: &Shared, path: &Path, kind: FileEventKind) {
    let mut state = shared.state.lock();
    if state.watcher.is_none() {
        return;
    }
    match state.sync.apply(shared.backend.as_dyn(), path, kind) {
        Ok(outcome) if outcome.ignored || outcome.unchanged => {
            debug!(path = %outcome.path, event = %kind, "File event skipped");
        }
        Ok(_) => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to apply file event"),
    }
}

/// Drop the pooled connection the calling (consumer) thread opened.
fn release_thread_connection(shared: &Shared) {
    if let ActiveBackend::Relational(backend) = &shared.backend {
        if backend.store().pool().release_current() {
            debug!("Released watcher connection");
        }
    }
}

impl Drop for TagAdapter {
    fn drop(&mut self) {
        self.stop_watching();
    }
}
