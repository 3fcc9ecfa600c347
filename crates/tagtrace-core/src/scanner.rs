//! Directory scanning for tags.
//!
//! Walks a project with `ignore::WalkBuilder` (so `.gitignore` and
//! `.tagtraceignore` are honoured), parses every text file in parallel and
//! turns the result into a flat index or an in-memory tag graph.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::migration::flat::{format_context, FlatEntry, FlatIndex};
use crate::parser::{extract_tags_with_positions, parse_tag_chains};
use crate::tags::{Position, TagChain, TagMatch};

/// Per-directory ignore file.
pub const IGNORE_FILENAME: &str = ".tagtraceignore";

/// Default file size limit.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.ico", "*.pdf", "*.zip", "*.gz", "*.tar", "*.so",
    "*.dylib", "*.dll", "*.exe", "*.o", "*.a", "*.class", "*.jar", "*.pyc", "*.woff", "*.woff2",
    "*.db", "*.db-wal", "*.db-shm", "*.sqlite", "*.lock",
];

const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    ".git",
    ".tagtrace",
    "node_modules",
    "target",
    "build",
    "dist",
    "__pycache__",
    ".venv",
    "venv",
];

/// Errors that can occur while scanning
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scan root does not exist: {0}")]
    RootNotFound(PathBuf),
}

/// Decides which paths are skipped beyond ignore files.
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    patterns: Vec<glob::Pattern>,
    exclude_dirs: HashSet<String>,
    exclude_hidden: bool,
}

impl Default for ExclusionFilter {
    fn default() -> Self {
        Self::new::<&str>(&[], true)
    }
}

impl ExclusionFilter {
    /// Defaults plus `extra` glob patterns. Invalid patterns are ignored.
    pub fn new<S: AsRef<str>>(extra: &[S], exclude_hidden: bool) -> Self {
        let patterns = DEFAULT_EXCLUDE_PATTERNS
            .iter()
            .copied()
            .chain(extra.iter().map(AsRef::as_ref))
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(pattern = p, error = %e, "Ignoring invalid exclude pattern");
                    None
                }
            })
            .collect();

        Self {
            patterns,
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            exclude_hidden,
        }
    }

    pub fn excludes_hidden(&self) -> bool {
        self.exclude_hidden
    }

    /// Check a path relative to the scan root.
    pub fn should_exclude(&self, rel_path: &Path) -> bool {
        for component in rel_path.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            let Some(name) = name.to_str() else {
                continue;
            };
            if self.exclude_dirs.contains(name) {
                return true;
            }
            if self.exclude_hidden && name.starts_with('.') && name != IGNORE_FILENAME {
                return true;
            }
        }

        let file_name = rel_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let full = rel_path.to_string_lossy().replace('\\', "/");
        self.patterns
            .iter()
            .any(|p| p.matches(&file_name) || p.matches(&full))
    }
}

/// Tags found in one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTags {
    /// Path relative to the scan root, `/`-separated.
    pub path: String,
    /// SHA-256 of the file contents.
    pub hash: String,
    pub tags: Vec<(TagMatch, Position)>,
    pub chains: Vec<TagChain>,
}

impl FileTags {
    /// Parse in-memory content.
    pub fn from_content(path: impl Into<String>, content: &str) -> Self {
        Self {
            path: path.into(),
            hash: hash_bytes(content.as_bytes()),
            tags: extract_tags_with_positions(content),
            chains: parse_tag_chains(content),
        }
    }

    /// Consecutive `(source, target)` keys from every chain in the file.
    pub fn links(&self) -> Vec<(String, String)> {
        self.chains.iter().flat_map(TagChain::links).collect()
    }
}

/// Result of a directory scan.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Files with at least one tag, sorted by path.
    pub files: Vec<FileTags>,
    pub files_scanned: usize,
    /// Files not read: too large, not UTF-8 or unreadable.
    pub files_skipped: usize,
}

impl ScanReport {
    pub fn tag_count(&self) -> usize {
        self.files.iter().map(|f| f.tags.len()).sum()
    }

    /// Flat index of every occurrence, with chain links as references.
    pub fn to_flat_index(&self) -> FlatIndex {
        build_flat_index(&self.files)
    }

    /// One `TagMatch` per key with merged references.
    pub fn tag_graph(&self) -> Vec<TagMatch> {
        collect_tag_graph(&self.files)
    }
}

/// Parallel tag scanner.
#[derive(Debug, Clone)]
pub struct TagScanner {
    filter: ExclusionFilter,
    max_file_size: u64,
}

impl Default for TagScanner {
    fn default() -> Self {
        Self::new(ExclusionFilter::default(), DEFAULT_MAX_FILE_SIZE)
    }
}

impl TagScanner {
    pub fn new(filter: ExclusionFilter, max_file_size: u64) -> Self {
        Self {
            filter,
            max_file_size,
        }
    }

    pub fn filter(&self) -> &ExclusionFilter {
        &self.filter
    }

    /// Scan every included file under `root`.
    pub fn scan(&self, root: &Path) -> Result<ScanReport, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::RootNotFound(root.to_path_buf()));
        }

        let files = self.find_files(root);
        let files_scanned = files.len();

        let results: Vec<Option<FileTags>> = files
            .par_iter()
            .map(|(abs, rel)| self.scan_file(abs, rel))
            .collect();

        let files_skipped = results.iter().filter(|r| r.is_none()).count();
        let mut tagged: Vec<FileTags> = results
            .into_iter()
            .flatten()
            .filter(|f| !f.tags.is_empty())
            .collect();
        tagged.sort_by(|a, b| a.path.cmp(&b.path));

        let report = ScanReport {
            files: tagged,
            files_scanned,
            files_skipped,
        };
        info!(
            root = %root.display(),
            files = files_scanned,
            tagged_files = report.files.len(),
            tags = report.tag_count(),
            "Scan complete"
        );
        Ok(report)
    }

    /// Parse one file. `None` if it cannot or should not be read.
    pub fn scan_file(&self, abs_path: &Path, rel_path: &str) -> Option<FileTags> {
        let meta = fs::metadata(abs_path).ok()?;
        if meta.len() > self.max_file_size {
            debug!(path = rel_path, size = meta.len(), "Skipping large file");
            return None;
        }
        let bytes = match fs::read(abs_path) {
            Ok(b) => b,
            Err(e) => {
                debug!(path = rel_path, error = %e, "Cannot read file");
                return None;
            }
        };
        let Ok(content) = std::str::from_utf8(&bytes) else {
            debug!(path = rel_path, "Skipping non UTF-8 file");
            return None;
        };
        Some(FileTags::from_content(rel_path, content))
    }

    /// Whether `rel_path` would be picked up by a scan.
    pub fn is_included(&self, rel_path: &Path) -> bool {
        !self.filter.should_exclude(rel_path)
    }

    fn find_files(&self, root: &Path) -> Vec<(PathBuf, String)> {
        let walker = WalkBuilder::new(root)
            .follow_links(false)
            .hidden(self.filter.excludes_hidden())
            .git_ignore(true)
            .git_exclude(true)
            .require_git(false)
            .add_custom_ignore_filename(IGNORE_FILENAME)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Error walking directory: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let abs = entry.path();
            let rel = relative_path(root, abs);
            if self.filter.should_exclude(Path::new(&rel)) {
                continue;
            }
            files.push((abs.to_path_buf(), rel));
        }
        files
    }
}

/// `/`-separated path of `path` relative to `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Hex SHA-256 of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hex SHA-256 of a file's contents.
pub fn compute_file_hash(path: &Path) -> std::io::Result<String> {
    Ok(hash_bytes(&fs::read(path)?))
}

/// Flat index of every tag occurrence; chain links become references.
pub fn build_flat_index(files: &[FileTags]) -> FlatIndex {
    let mut flat = FlatIndex::new();
    for file in files {
        for (tag, pos) in &file.tags {
            flat.add_entry(
                tag.key(),
                FlatEntry {
                    file: file.path.clone(),
                    line: pos.line as u32,
                    context: format_context(&tag.category, &tag.identifier, tag.description.as_deref()),
                },
            );
        }
        for (source, target) in file.links() {
            flat.add_reference(source, target);
        }
    }
    flat.recompute_statistics();
    flat
}

/// One tag per key (first occurrence wins) carrying all outgoing chain links.
pub fn collect_tag_graph(files: &[FileTags]) -> Vec<TagMatch> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: BTreeMap<String, TagMatch> = BTreeMap::new();

    for file in files {
        for (tag, _) in &file.tags {
            let key = tag.key();
            if !by_key.contains_key(&key) {
                order.push(key.clone());
                by_key.insert(key, tag.clone());
            }
        }
    }
    for file in files {
        for (source, target) in file.links() {
            if let Some(tag) = by_key.get_mut(&source) {
                if !tag.references.contains(&target) {
                    tag.references.push(target);
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect()
}
