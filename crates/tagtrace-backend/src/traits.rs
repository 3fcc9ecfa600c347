//! Backend trait definition.
//!
//! Both the relational store and the flat JSON file implement [`TagBackend`];
//! the adapter picks one at construction and calls through this trait.

use tagtrace_core::search::{Direction, TagStatistics};
use tagtrace_core::{FileTags, FlatIndex};

use crate::error::BackendError;
use crate::types::{BackendKind, ChainResult, SearchFilters, TagInfo};

/// Row counts from replacing one file's tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileReplacement {
    pub removed: usize,
    pub inserted: usize,
    pub references: usize,
}

/// Storage backend for tags.
///
/// All operations are synchronous; implementations guard their own state and
/// may be shared across threads.
pub trait TagBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Current contents as a flat index.
    fn load_index(&self) -> Result<FlatIndex, BackendError>;

    /// Replace all contents with `index`.
    fn save_index(&self, index: &FlatIndex) -> Result<(), BackendError>;

    /// Tags of one category, narrowed by `filters`.
    fn search_by_category(
        &self,
        category: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<TagInfo>, BackendError>;

    /// Reference tree around `tag_key`. Unknown keys give `found: false`.
    fn get_traceability_chain(
        &self,
        tag_key: &str,
        direction: Direction,
        max_depth: usize,
    ) -> Result<ChainResult, BackendError>;

    /// Drop everything recorded for `path` and, if `tags` is given, insert the
    /// freshly parsed contents. Applied atomically.
    fn replace_file(
        &self,
        path: &str,
        tags: Option<&FileTags>,
    ) -> Result<FileReplacement, BackendError>;

    /// Replace all contents with every occurrence in `files`. Links are
    /// resolved only after all rows exist, so cross-file chains survive.
    fn replace_all(&self, files: &[FileTags]) -> Result<FileReplacement, BackendError>;

    fn statistics(&self) -> Result<TagStatistics, BackendError>;
}
