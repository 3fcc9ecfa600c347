//! Flat-file fallback backend.
//!
//! Reads and writes the JSON flat index directly. Chain traversal needs real
//! edges between stored rows and degrades to the root node only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use tagtrace_core::migration::flat::{description_from_context, format_context};
use tagtrace_core::migration::FlatEntry;
use tagtrace_core::scanner::build_flat_index;
use tagtrace_core::search::stats::DEFAULT_TOP_FILES;
use tagtrace_core::search::{Direction, FileCount, TagStatistics};
use tagtrace_core::{parse_tag_key, FileTags, FlatIndex};

use crate::error::BackendError;
use crate::traits::{FileReplacement, TagBackend};
use crate::types::{
    BackendKind, ChainNodeInfo, ChainResult, SearchFilters, TagInfo, RELATIONAL_UNAVAILABLE,
};

pub struct FlatFileBackend {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file.
    write_lock: Mutex<()>,
}

impl FlatFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(path = %path.display(), "Flat index backend");
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn read(&self) -> Result<FlatIndex, BackendError> {
        if !self.exists() {
            debug!(path = %self.path.display(), "Flat index missing, using empty index");
            return Ok(FlatIndex::new());
        }
        Ok(FlatIndex::load(&self.path)?)
    }
}

fn entry_info(key: &str, entry: &FlatEntry) -> Option<TagInfo> {
    let parsed = parse_tag_key(key)?;
    Some(TagInfo {
        key: key.to_string(),
        category: parsed.category,
        identifier: parsed.identifier,
        description: description_from_context(key, &entry.context),
        file_path: entry.file.clone(),
        line_number: entry.line,
    })
}

impl TagBackend for FlatFileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::FlatFile
    }

    fn load_index(&self) -> Result<FlatIndex, BackendError> {
        self.read()
    }

    fn save_index(&self, index: &FlatIndex) -> Result<(), BackendError> {
        let _guard = self.write_lock.lock();
        index.save(&self.path)?;
        Ok(())
    }

    fn search_by_category(
        &self,
        category: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<TagInfo>, BackendError> {
        let flat = self.read()?;
        let prefix = format!("{category}:");

        let matches = flat
            .index
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .flat_map(|(key, entries)| entries.iter().filter_map(move |e| entry_info(key, e)))
            .filter(|tag| filters.matches(tag))
            .take(filters.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(matches)
    }

    fn get_traceability_chain(
        &self,
        tag_key: &str,
        direction: Direction,
        max_depth: usize,
    ) -> Result<ChainResult, BackendError> {
        let flat = self.read()?;
        let root = flat
            .index
            .get(tag_key)
            .and_then(|entries| entries.first())
            .and_then(|entry| entry_info(tag_key, entry))
            .map(|tag| ChainNodeInfo {
                key: tag.key,
                description: tag.description,
                file_path: tag.file_path,
                line_number: tag.line_number,
                depth: 0,
                relation: "root".to_string(),
                children: Vec::new(),
            });

        Ok(ChainResult::degraded(
            tag_key,
            direction,
            max_depth,
            root,
            BackendKind::FlatFile,
            RELATIONAL_UNAVAILABLE,
        ))
    }

    fn replace_file(
        &self,
        path: &str,
        tags: Option<&FileTags>,
    ) -> Result<FileReplacement, BackendError> {
        let _guard = self.write_lock.lock();
        let mut flat = self.read()?;

        let mut counts = FileReplacement {
            removed: flat.remove_file(path),
            ..Default::default()
        };

        if let Some(file) = tags {
            for (tag, pos) in &file.tags {
                flat.add_entry(
                    tag.key(),
                    FlatEntry {
                        file: path.to_string(),
                        line: pos.line as u32,
                        context: format_context(
                            &tag.category,
                            &tag.identifier,
                            tag.description.as_deref(),
                        ),
                    },
                );
                counts.inserted += 1;
            }
            for (source, target) in file.links() {
                let known = flat
                    .references
                    .get(&source)
                    .is_some_and(|targets| targets.contains(&target));
                if !known {
                    flat.add_reference(source, target);
                    counts.references += 1;
                }
            }
        }

        flat.recompute_statistics();
        flat.save(&self.path)?;
        Ok(counts)
    }

    fn replace_all(&self, files: &[FileTags]) -> Result<FileReplacement, BackendError> {
        let _guard = self.write_lock.lock();
        let removed = self.read()?.occurrence_count();

        let flat = build_flat_index(files);
        flat.save(&self.path)?;
        Ok(FileReplacement {
            removed,
            inserted: flat.occurrence_count(),
            references: flat.reference_count(),
        })
    }

    fn statistics(&self) -> Result<TagStatistics, BackendError> {
        let flat = self.read()?;

        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        let mut per_file: BTreeMap<&str, usize> = BTreeMap::new();
        for (key, entries) in &flat.index {
            if let Some(parsed) = parse_tag_key(key) {
                *by_category.entry(parsed.category).or_default() += entries.len();
            }
            for entry in entries {
                *per_file.entry(entry.file.as_str()).or_default() += 1;
            }
        }

        let mut top_files: Vec<FileCount> = per_file
            .into_iter()
            .map(|(file, n)| FileCount {
                file_path: file.to_string(),
                tag_count: n,
            })
            .collect();
        top_files.sort_by(|a, b| {
            b.tag_count
                .cmp(&a.tag_count)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        top_files.truncate(DEFAULT_TOP_FILES);

        Ok(TagStatistics {
            total_tags: flat.occurrence_count(),
            by_category,
            total_references: flat.reference_count(),
            top_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn backend(dir: &TempDir) -> FlatFileBackend {
        FlatFileBackend::new(dir.path().join("data/tags.json"))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        assert!(backend.load_index().unwrap().index.is_empty());
        assert_eq!(backend.statistics().unwrap().total_tags, 0);
    }

    #[test]
    fn test_replace_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let file = FileTags::from_content("a.md", "@REQ:A1 Login\n@REQ:A1 → @TEST:A1\n");

        let counts = backend.replace_file("a.md", Some(&file)).unwrap();
        assert_eq!(counts.inserted, 3);
        assert_eq!(counts.references, 1);
        assert!(backend.exists());

        let flat = backend.load_index().unwrap();
        assert_eq!(flat.index["REQ:A1"].len(), 2);
        assert_eq!(flat.statistics.total_tags, 2);

        let counts = backend.replace_file("a.md", None).unwrap();
        assert_eq!(counts.removed, 3);
        assert!(backend.load_index().unwrap().index.is_empty());
    }

    #[test]
    fn test_search_by_category() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let file = FileTags::from_content("a.md", "@REQ:AUTH-1 Login\n@REQ:PAY-1\n@REQUEST:X1\n");
        backend.replace_file("a.md", Some(&file)).unwrap();

        let found = backend
            .search_by_category(
                "REQ",
                &SearchFilters {
                    description: Some("login".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "REQ:AUTH-1");
        assert_eq!(found[0].line_number, 1);
    }

    #[test]
    fn test_chain_degrades_to_root() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let file = FileTags::from_content("a.md", "@REQ:A1 → @TEST:A1\n");
        backend.replace_file("a.md", Some(&file)).unwrap();

        let chain = backend
            .get_traceability_chain("REQ:A1", Direction::Forward, 5)
            .unwrap();
        assert!(chain.found);
        assert_eq!(chain.node_count, 1);
        assert_eq!(chain.root.unwrap().children.len(), 0);
        assert_eq!(chain.unavailable_reason.as_deref(), Some(RELATIONAL_UNAVAILABLE));

        let missing = backend
            .get_traceability_chain("REQ:NOPE", Direction::Forward, 5)
            .unwrap();
        assert!(!missing.found);
    }

    #[test]
    fn test_statistics() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        backend
            .replace_file("a.md", Some(&FileTags::from_content("a.md", "@REQ:A1\n@TEST:A1\n")))
            .unwrap();
        backend
            .replace_file("b.md", Some(&FileTags::from_content("b.md", "@REQ:A1\n")))
            .unwrap();

        let stats = backend.statistics().unwrap();
        assert_eq!(stats.total_tags, 3);
        assert_eq!(stats.by_category["REQ"], 2);
        assert_eq!(stats.top_files[0].file_path, "a.md");
    }
}
