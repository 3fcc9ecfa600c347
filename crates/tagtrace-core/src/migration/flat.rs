//! Flat index model (JSON interchange format).
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "statistics": { "total_tags": 2, "categories": { "primary": 2 } },
//!   "index": {
//!     "REQ:AUTH-001": [{ "file": "docs/req.md", "line": 3, "context": "@REQ:AUTH-001 Login" }]
//!   },
//!   "references": { "REQ:AUTH-001": ["DESIGN:AUTH-001"] }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tags::{format_tag_key, parse_tag_key, CategoryFamily, TagMatch};

/// Version written by the exporter.
pub const FLAT_INDEX_VERSION: &str = "1.0";

/// Statistics key used for categories outside the four families.
pub const CUSTOM_FAMILY: &str = "custom";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatEntry {
    pub file: String,
    pub line: u32,
    pub context: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatStatistics {
    /// Distinct tag keys.
    pub total_tags: usize,
    /// Family name → distinct keys in that family.
    pub categories: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatIndex {
    pub version: String,
    #[serde(default)]
    pub statistics: FlatStatistics,
    #[serde(default)]
    pub index: BTreeMap<String, Vec<FlatEntry>>,
    #[serde(default)]
    pub references: BTreeMap<String, Vec<String>>,
}

impl Default for FlatIndex {
    fn default() -> Self {
        Self {
            version: FLAT_INDEX_VERSION.to_string(),
            statistics: FlatStatistics::default(),
            index: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and strictly deserialize a flat index file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(std::io::Error::from)
    }

    /// Write as pretty JSON, replacing the file.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::from)?;
        std::fs::write(path, json)
    }

    /// Build an index from a JSON value, keeping whatever is well-formed.
    ///
    /// Entries or references that cannot be read are reported as strings
    /// instead of failing the whole document. A missing `version` defaults to
    /// [`FLAT_INDEX_VERSION`].
    pub fn from_value_lenient(value: &Value) -> (Self, Vec<String>) {
        let mut errors = Vec::new();
        let mut flat = FlatIndex::new();

        let Some(root) = value.as_object() else {
            errors.push("flat index root is not an object".to_string());
            return (flat, errors);
        };

        if let Some(v) = root.get("version").and_then(Value::as_str) {
            flat.version = v.to_string();
        }
        if let Some(stats) = root.get("statistics") {
            match serde_json::from_value::<FlatStatistics>(stats.clone()) {
                Ok(s) => flat.statistics = s,
                Err(e) => errors.push(format!("statistics: {e}")),
            }
        }

        match root.get("index") {
            Some(Value::Object(index)) => {
                for (key, entries) in index {
                    let Some(list) = entries.as_array() else {
                        errors.push(format!("index.{key}: expected an array of entries"));
                        continue;
                    };
                    let mut parsed = Vec::with_capacity(list.len());
                    for (i, entry) in list.iter().enumerate() {
                        match serde_json::from_value::<FlatEntry>(entry.clone()) {
                            Ok(e) => parsed.push(e),
                            Err(e) => errors.push(format!("index.{key}.{i}: {e}")),
                        }
                    }
                    flat.index.insert(key.clone(), parsed);
                }
            }
            Some(_) => errors.push("index: expected an object".to_string()),
            None => {}
        }

        match root.get("references") {
            Some(Value::Object(refs)) => {
                for (source, targets) in refs {
                    let Some(list) = targets.as_array() else {
                        errors.push(format!("references.{source}: expected an array"));
                        continue;
                    };
                    let mut out = Vec::with_capacity(list.len());
                    for (i, t) in list.iter().enumerate() {
                        match t.as_str() {
                            Some(s) => out.push(s.to_string()),
                            None => errors.push(format!("references.{source}.{i}: expected a string")),
                        }
                    }
                    flat.references.insert(source.clone(), out);
                }
            }
            Some(_) => errors.push("references: expected an object".to_string()),
            None => {}
        }

        (flat, errors)
    }

    /// Add one occurrence of a key.
    pub fn add_entry(&mut self, key: impl Into<String>, entry: FlatEntry) {
        self.index.entry(key.into()).or_default().push(entry);
    }

    /// Add a reference, keeping targets sorted and unique.
    pub fn add_reference(&mut self, source: impl Into<String>, target: impl Into<String>) {
        let targets = self.references.entry(source.into()).or_default();
        let target = target.into();
        if let Err(pos) = targets.binary_search(&target) {
            targets.insert(pos, target);
        }
    }

    /// Recompute `statistics` from `index`.
    pub fn recompute_statistics(&mut self) {
        let mut categories: BTreeMap<String, usize> = BTreeMap::new();
        for key in self.index.keys() {
            let family = parse_tag_key(key)
                .and_then(|k| CategoryFamily::of(&k.category))
                .map(|f| f.as_str())
                .unwrap_or(CUSTOM_FAMILY);
            *categories.entry(family.to_string()).or_default() += 1;
        }
        self.statistics = FlatStatistics {
            total_tags: self.index.len(),
            categories,
        };
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.index.keys().cloned().collect()
    }

    /// Total entries across all keys.
    pub fn occurrence_count(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    pub fn reference_count(&self) -> usize {
        self.references.values().map(Vec::len).sum()
    }

    /// Drop every entry recorded for `file`. Keys left without entries are
    /// removed together with references that touch them. Returns the number
    /// of entries removed.
    pub fn remove_file(&mut self, file: &str) -> usize {
        let mut removed = 0;
        self.index.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|e| e.file != file);
            removed += before - entries.len();
            !entries.is_empty()
        });

        let index = &self.index;
        self.references.retain(|source, targets| {
            targets.retain(|t| index.contains_key(t));
            index.contains_key(source) && !targets.is_empty()
        });
        removed
    }

    /// One tag per key built from its first entry, carrying its references.
    /// Keys that do not parse are skipped.
    pub fn tag_graph(&self) -> Vec<TagMatch> {
        self.index
            .iter()
            .filter_map(|(key, entries)| {
                let parsed = parse_tag_key(key)?;
                let description = entries
                    .first()
                    .and_then(|e| description_from_context(key, &e.context));
                let references = self.references.get(key).cloned().unwrap_or_default();
                Some(TagMatch {
                    category: parsed.category,
                    identifier: parsed.identifier,
                    description,
                    references,
                })
            })
            .collect()
    }
}

/// `@KEY description` or `@KEY` alone.
pub fn format_context(category: &str, identifier: &str, description: Option<&str>) -> String {
    let key = format_tag_key(category, identifier);
    match description.map(str::trim).filter(|d| !d.is_empty()) {
        Some(desc) => format!("@{key} {desc}"),
        None => format!("@{key}"),
    }
}

/// Recover a description from a context line.
///
/// Text after the first literal `@KEY` is used when present, otherwise the
/// whole context. The marker must end at an identifier boundary, so `@REQ:A1`
/// does not match inside `@REQ:A10`. Blank results are `None`.
pub fn description_from_context(key: &str, context: &str) -> Option<String> {
    let marker = format!("@{key}");
    let rest = context
        .match_indices(&marker)
        .map(|(pos, _)| &context[pos + marker.len()..])
        .find(|rest| !rest.starts_with(is_identifier_char))
        .unwrap_or(context);
    let rest = rest.trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-'
}
