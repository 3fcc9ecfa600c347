//! Incremental file-level sync.
//!
//! Each file event re-parses one file and replaces everything the backend
//! holds for that path. Content hashes of applied files are remembered so a
//! modification that leaves the bytes unchanged is a no-op.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use tagtrace_core::scanner::relative_path;
use tagtrace_core::{ScanReport, TagScanner};

use crate::error::BackendError;
use crate::traits::TagBackend;
use crate::types::{FileEventKind, SyncOutcome};

/// Per-project sync state. Callers serialize access (the adapter holds it
/// behind its sync mutex).
#[derive(Debug)]
pub struct IncrementalSync {
    root: PathBuf,
    scanner: TagScanner,
    hashes: HashMap<String, String>,
}

impl IncrementalSync {
    /// `root` is canonicalized so it compares equal to the absolute paths
    /// the watcher reports.
    pub fn new(root: impl Into<PathBuf>, scanner: TagScanner) -> Self {
        Self {
            root: canonical_root(root.into()),
            scanner,
            hashes: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scanner(&self) -> &TagScanner {
        &self.scanner
    }

    /// Number of files with a remembered hash.
    pub fn tracked_files(&self) -> usize {
        self.hashes.len()
    }

    /// Forget all hashes and remember those from a full scan.
    pub fn seed(&mut self, report: &ScanReport) {
        self.hashes = report
            .files
            .iter()
            .map(|f| (f.path.clone(), f.hash.clone()))
            .collect();
        debug!(files = self.hashes.len(), "Sync state seeded from scan");
    }

    /// Resolve `path` (absolute or root-relative) to `(absolute, relative)`.
    pub fn resolve(&self, path: &Path) -> Result<(PathBuf, String), BackendError> {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if !abs.starts_with(&self.root) {
            return Err(BackendError::outside_root(path));
        }
        let rel = relative_path(&self.root, &abs);
        Ok((abs, rel))
    }

    /// Apply one file event to `backend`.
    pub fn apply(
        &mut self,
        backend: &dyn TagBackend,
        path: &Path,
        kind: FileEventKind,
    ) -> Result<SyncOutcome, BackendError> {
        let (abs, rel) = self.resolve(path)?;
        let mut outcome = SyncOutcome::new(&rel, kind);

        if rel.is_empty() || abs.is_dir() || !self.scanner.is_included(Path::new(&rel)) {
            outcome.ignored = true;
            return Ok(outcome);
        }

        let parsed = match kind {
            FileEventKind::Deleted => None,
            FileEventKind::Created | FileEventKind::Modified => {
                self.scanner.scan_file(&abs, &rel)
            }
        };

        if let Some(file) = &parsed {
            if self.hashes.get(&rel) == Some(&file.hash) {
                outcome.unchanged = true;
                debug!(path = %rel, "Content unchanged, skipping");
                return Ok(outcome);
            }
        }

        let counts = backend.replace_file(&rel, parsed.as_ref())?;
        match &parsed {
            Some(file) => {
                self.hashes.insert(rel.clone(), file.hash.clone());
            }
            None => {
                self.hashes.remove(&rel);
            }
        }

        outcome.tags_removed = counts.removed;
        outcome.tags_inserted = counts.inserted;
        outcome.references_inserted = counts.references;
        info!(
            path = %rel,
            event = %kind,
            removed = counts.removed,
            inserted = counts.inserted,
            "Applied file change"
        );
        Ok(outcome)
    }
}

/// Canonical form of `root`, or `root` made absolute when it cannot be
/// resolved (for example because it does not exist yet).
pub fn canonical_root(root: PathBuf) -> PathBuf {
    match root.canonicalize() {
        Ok(path) => path,
        Err(_) if root.is_relative() => std::env::current_dir()
            .map(|cwd| cwd.join(&root))
            .unwrap_or(root),
        Err(_) => root,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteBackend;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tagtrace_core::TagStore;
    use tempfile::TempDir;

    fn setup() -> (TempDir, IncrementalSync, SqliteBackend) {
        let dir = TempDir::new().unwrap();
        let sync = IncrementalSync::new(dir.path(), TagScanner::default());
        let backend = SqliteBackend::from_store(TagStore::in_memory().unwrap());
        (dir, sync, backend)
    }

    #[test]
    fn test_create_modify_delete() {
        let (dir, mut sync, backend) = setup();
        let file = dir.path().join("req.md");

        fs::write(&file, "@REQ:A1 Login\n").unwrap();
        let out = sync.apply(&backend, &file, FileEventKind::Created).unwrap();
        assert_eq!(out.path, "req.md");
        assert_eq!(out.tags_inserted, 1);

        fs::write(&file, "@REQ:A1 Login\n@TEST:A1\n").unwrap();
        let out = sync.apply(&backend, &file, FileEventKind::Modified).unwrap();
        assert_eq!(out.tags_removed, 1);
        assert_eq!(out.tags_inserted, 2);
        assert_eq!(backend.store().count_tags().unwrap(), 2);

        fs::remove_file(&file).unwrap();
        let out = sync.apply(&backend, &file, FileEventKind::Deleted).unwrap();
        assert_eq!(out.tags_removed, 2);
        assert_eq!(backend.store().count_tags().unwrap(), 0);
        assert_eq!(sync.tracked_files(), 0);
    }

    #[test]
    fn test_unchanged_content_skipped() {
        let (dir, mut sync, backend) = setup();
        fs::write(dir.path().join("a.md"), "@REQ:A1\n").unwrap();

        sync.apply(&backend, Path::new("a.md"), FileEventKind::Created)
            .unwrap();
        let out = sync
            .apply(&backend, Path::new("a.md"), FileEventKind::Modified)
            .unwrap();
        assert!(out.unchanged);
        assert_eq!(backend.store().count_tags().unwrap(), 1);
    }

    #[test]
    fn test_excluded_and_outside_paths() {
        let (dir, mut sync, backend) = setup();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/x.md"), "@REQ:A1\n").unwrap();

        let out = sync
            .apply(&backend, Path::new("node_modules/x.md"), FileEventKind::Created)
            .unwrap();
        assert!(out.ignored);
        assert_eq!(backend.store().count_tags().unwrap(), 0);

        let err = sync
            .apply(&backend, Path::new("/somewhere/else.md"), FileEventKind::Created)
            .unwrap_err();
        assert!(matches!(err, BackendError::OutsideRoot { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_relative_root_matches_absolute_events() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "@REQ:A1\n").unwrap();

        // Same directory, spelled relative to the working directory
        let cwd = std::env::current_dir().unwrap();
        let relative: PathBuf = cwd
            .components()
            .skip(1)
            .map(|_| Path::new(".."))
            .collect::<PathBuf>()
            .join(dir.path().strip_prefix("/").unwrap());
        assert!(relative.is_relative());

        let mut sync = IncrementalSync::new(&relative, TagScanner::default());
        assert!(sync.root().is_absolute());

        let backend = SqliteBackend::from_store(TagStore::in_memory().unwrap());
        let abs = dir.path().canonicalize().unwrap().join("a.md");
        let out = sync.apply(&backend, &abs, FileEventKind::Created).unwrap();
        assert_eq!(out.path, "a.md");
        assert_eq!(out.tags_inserted, 1);
    }

    #[test]
    fn test_modified_to_unreadable_removes_rows() {
        let (dir, mut sync, backend) = setup();
        let file = dir.path().join("a.md");
        fs::write(&file, "@REQ:A1\n").unwrap();
        sync.apply(&backend, &file, FileEventKind::Created).unwrap();

        fs::write(&file, [0xff, 0xfe, 0xfd]).unwrap();
        let out = sync.apply(&backend, &file, FileEventKind::Modified).unwrap();
        assert_eq!(out.tags_removed, 1);
        assert_eq!(backend.store().count_tags().unwrap(), 0);
    }
}
