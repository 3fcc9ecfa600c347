//! Shared types for backend operations.

use serde::{Deserialize, Serialize};
use tagtrace_core::search::{ChainNode, Direction, TraceabilityChain};
use tagtrace_core::StoredTag;

/// Marker placed on results the flat fallback cannot compute.
pub const RELATIONAL_UNAVAILABLE: &str = "relational backend unavailable";

/// Which backend the adapter selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Relational,
    FlatFile,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relational => write!(f, "relational"),
            Self::FlatFile => write!(f, "flat-file"),
        }
    }
}

/// One tag occurrence as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    pub key: String,
    pub category: String,
    pub identifier: String,
    pub description: Option<String>,
    pub file_path: String,
    pub line_number: u32,
}

impl From<StoredTag> for TagInfo {
    fn from(tag: StoredTag) -> Self {
        Self {
            key: tag.key(),
            category: tag.category,
            identifier: tag.identifier,
            description: tag.description,
            file_path: tag.file_path,
            line_number: tag.line_number,
        }
    }
}

/// Optional filters for `search_by_category`. All given filters must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    /// Substring of the identifier
    pub identifier: Option<String>,

    /// Substring of the file path
    pub file: Option<String>,

    /// Substring of the description
    pub description: Option<String>,

    pub limit: Option<usize>,
}

impl SearchFilters {
    /// Case-insensitive substring check used by the flat backend.
    pub fn matches(&self, tag: &TagInfo) -> bool {
        fn contains(haystack: &str, needle: &Option<String>) -> bool {
            needle
                .as_ref()
                .is_none_or(|n| haystack.to_lowercase().contains(&n.to_lowercase()))
        }
        contains(&tag.identifier, &self.identifier)
            && contains(&tag.file_path, &self.file)
            && contains(tag.description.as_deref().unwrap_or(""), &self.description)
    }
}

/// A node of a traceability chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNodeInfo {
    pub key: String,
    pub description: Option<String>,
    pub file_path: String,
    pub line_number: u32,
    pub depth: usize,
    /// `root`, `forward` or `backward`
    pub relation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChainNodeInfo>,
}

impl From<ChainNode> for ChainNodeInfo {
    fn from(node: ChainNode) -> Self {
        Self {
            key: node.key,
            description: node.description,
            file_path: node.file_path,
            line_number: node.line_number,
            depth: node.depth,
            relation: node.relation.as_str().to_string(),
            children: node.children.into_iter().map(Into::into).collect(),
        }
    }
}

/// Chain traversal result, annotated when it had to degrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainResult {
    pub tag_key: String,
    pub found: bool,
    pub direction: Direction,
    pub max_depth: usize,
    pub root: Option<ChainNodeInfo>,
    pub node_count: usize,
    pub truncated: bool,
    pub backend: BackendKind,
    /// Set when the result is a single-node placeholder.
    pub unavailable_reason: Option<String>,
}

impl ChainResult {
    pub fn from_chain(chain: TraceabilityChain) -> Self {
        Self {
            tag_key: chain.tag_key,
            found: chain.found,
            direction: chain.direction,
            max_depth: chain.max_depth,
            root: chain.root.map(Into::into),
            node_count: chain.node_count,
            truncated: chain.truncated,
            backend: BackendKind::Relational,
            unavailable_reason: None,
        }
    }

    /// Root-only result carrying `reason`.
    pub fn degraded(
        tag_key: &str,
        direction: Direction,
        max_depth: usize,
        root: Option<ChainNodeInfo>,
        backend: BackendKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            tag_key: tag_key.to_string(),
            found: root.is_some(),
            direction,
            max_depth,
            node_count: usize::from(root.is_some()),
            root,
            truncated: false,
            backend,
            unavailable_reason: Some(reason.into()),
        }
    }
}

/// Kind of file change delivered to the incremental sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
}

impl std::fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for FileEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" | "create" => Ok(Self::Created),
            "modified" | "modify" | "changed" => Ok(Self::Modified),
            "deleted" | "delete" | "removed" => Ok(Self::Deleted),
            other => Err(format!("unknown file event kind: {other}")),
        }
    }
}

/// What one file event did to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Project-relative path
    pub path: String,
    pub kind: FileEventKind,
    pub tags_removed: usize,
    pub tags_inserted: usize,
    pub references_inserted: usize,
    /// Content hash matched the last applied version
    pub unchanged: bool,
    /// Path is excluded from scanning
    pub ignored: bool,
}

impl SyncOutcome {
    pub fn new(path: impl Into<String>, kind: FileEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
            tags_removed: 0,
            tags_inserted: 0,
            references_inserted: 0,
            unchanged: false,
            ignored: false,
        }
    }
}

/// Result of a full rescan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub files_scanned: usize,
    pub tagged_files: usize,
    pub tags: usize,
    pub keys: usize,
    pub references: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(identifier: &str, file: &str, description: Option<&str>) -> TagInfo {
        TagInfo {
            key: format!("REQ:{identifier}"),
            category: "REQ".into(),
            identifier: identifier.into(),
            description: description.map(String::from),
            file_path: file.into(),
            line_number: 1,
        }
    }

    #[test]
    fn test_filters_match() {
        let filters = SearchFilters {
            identifier: Some("auth".into()),
            file: Some("docs/".into()),
            ..Default::default()
        };
        assert!(filters.matches(&tag("AUTH-1", "docs/a.md", None)));
        assert!(!filters.matches(&tag("AUTH-1", "src/a.rs", None)));
        assert!(!filters.matches(&tag("PAY-1", "docs/a.md", None)));
        assert!(SearchFilters::default().matches(&tag("X1", "a", None)));
    }

    #[test]
    fn test_event_kind_parse() {
        assert_eq!("Modified".parse::<FileEventKind>().unwrap(), FileEventKind::Modified);
        assert_eq!("removed".parse::<FileEventKind>().unwrap(), FileEventKind::Deleted);
        assert!("renamed".parse::<FileEventKind>().is_err());
    }

    #[test]
    fn test_degraded_chain() {
        let result = ChainResult::degraded(
            "REQ:A1",
            Direction::Forward,
            3,
            None,
            BackendKind::FlatFile,
            RELATIONAL_UNAVAILABLE,
        );
        assert!(!result.found);
        assert_eq!(result.node_count, 0);
        assert_eq!(result.unavailable_reason.as_deref(), Some(RELATIONAL_UNAVAILABLE));
    }
}
