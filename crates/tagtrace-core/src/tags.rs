//! Tag Taxonomy and Shared Tag Types
//!
//! This module defines the category taxonomies and the value types produced by
//! the parser and consumed by the validator, storage and migration layers.
//!
//! Tag format: `@{CATEGORY}:{IDENTIFIER}[ description]`
//!
//! Examples:
//! - `@REQ:AUTH-001 User can log in` → requirement with description
//! - `@TEST:AUTH-001` → test tag without description
//! - `@REQ:AUTH-001 → @DESIGN:AUTH-001 → @TASK:AUTH-001` → a tag chain
//!
//! Two category sets exist on purpose. The parser recognises the 16 categories
//! of [`PARSER_CATEGORIES`]; the storage engine additionally accepts `CUSTOM`
//! ([`STORAGE_CATEGORIES`]).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Taxonomies
// ============================================================================

/// Categories recognised by the text parser.
pub const PARSER_CATEGORIES: [&str; 16] = [
    "REQ", "DESIGN", "TASK", "TEST", "VISION", "STRUCT", "TECH", "ADR", "FEATURE", "API", "UI",
    "DATA", "PERF", "SEC", "DOCS", "TAG",
];

/// Categories accepted by the storage engine.
pub const STORAGE_CATEGORIES: [&str; 17] = [
    "REQ", "DESIGN", "TASK", "TEST", "VISION", "STRUCT", "TECH", "ADR", "FEATURE", "API", "UI",
    "DATA", "PERF", "SEC", "DOCS", "TAG", "CUSTOM",
];

/// The Primary chain, in traversal order.
pub const PRIMARY_CHAIN: [&str; 4] = ["REQ", "DESIGN", "TASK", "TEST"];

/// Separator between tags of a chain.
pub const CHAIN_SEPARATOR: char = '→';

/// Canonical identifier shape: uppercase, digits, inner hyphens.
pub static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9-]*[A-Z0-9]$").expect("identifier pattern is valid"));

/// Check whether a category belongs to the parser taxonomy.
pub fn is_parser_category(category: &str) -> bool {
    PARSER_CATEGORIES.contains(&category)
}

/// Check whether a category belongs to the storage taxonomy.
pub fn is_storage_category(category: &str) -> bool {
    STORAGE_CATEGORIES.contains(&category)
}

/// Check whether an identifier has the canonical shape.
pub fn is_canonical_identifier(identifier: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(identifier)
}

// ============================================================================
// Category Family
// ============================================================================

/// Grouping of the 16 parser categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryFamily {
    /// REQ, DESIGN, TASK, TEST
    Primary,
    /// VISION, STRUCT, TECH, ADR
    Steering,
    /// FEATURE, API, UI, DATA
    Implementation,
    /// PERF, SEC, DOCS, TAG
    Quality,
}

impl CategoryFamily {
    /// All families in declaration order.
    pub const ALL: [CategoryFamily; 4] = [
        CategoryFamily::Primary,
        CategoryFamily::Steering,
        CategoryFamily::Implementation,
        CategoryFamily::Quality,
    ];

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryFamily::Primary => "primary",
            CategoryFamily::Steering => "steering",
            CategoryFamily::Implementation => "implementation",
            CategoryFamily::Quality => "quality",
        }
    }

    /// Categories belonging to this family.
    pub fn categories(&self) -> &'static [&'static str] {
        match self {
            CategoryFamily::Primary => &PRIMARY_CHAIN,
            CategoryFamily::Steering => &["VISION", "STRUCT", "TECH", "ADR"],
            CategoryFamily::Implementation => &["FEATURE", "API", "UI", "DATA"],
            CategoryFamily::Quality => &["PERF", "SEC", "DOCS", "TAG"],
        }
    }

    /// Family of a category, if it belongs to the parser taxonomy.
    pub fn of(category: &str) -> Option<CategoryFamily> {
        Self::ALL
            .into_iter()
            .find(|family| family.categories().contains(&category))
    }
}

impl fmt::Display for CategoryFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CategoryFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "primary" => Ok(CategoryFamily::Primary),
            "steering" => Ok(CategoryFamily::Steering),
            "implementation" => Ok(CategoryFamily::Implementation),
            "quality" => Ok(CategoryFamily::Quality),
            other => Err(format!("unknown category family: {other}")),
        }
    }
}

// ============================================================================
// Tag Key
// ============================================================================

/// Logical identity of a tag: `CATEGORY:IDENTIFIER`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagKey {
    pub category: String,
    pub identifier: String,
}

impl TagKey {
    pub fn new(category: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.identifier)
    }
}

impl FromStr for TagKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_tag_key(s).ok_or_else(|| format!("malformed tag key: {s}"))
    }
}

/// Split a `CATEGORY:IDENTIFIER` key on its first colon.
///
/// A leading `@` is tolerated. Both halves must be non-empty; no taxonomy
/// check is made here.
pub fn parse_tag_key(key: &str) -> Option<TagKey> {
    let key = key.trim();
    let key = key.strip_prefix('@').unwrap_or(key);
    let (category, identifier) = key.split_once(':')?;
    let (category, identifier) = (category.trim(), identifier.trim());
    if category.is_empty() || identifier.is_empty() {
        return None;
    }
    Some(TagKey::new(category, identifier))
}

/// Format a key from its parts.
pub fn format_tag_key(category: &str, identifier: &str) -> String {
    format!("{category}:{identifier}")
}

// ============================================================================
// Parser Output Types
// ============================================================================

/// One tag found in text.
///
/// `references` is an in-memory list of tag keys this tag points to. The
/// parser leaves it empty; scanners fill it from chains and the validator
/// reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMatch {
    pub category: String,
    pub identifier: String,
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl TagMatch {
    pub fn new(category: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            identifier: identifier.into(),
            description: None,
            references: Vec::new(),
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach outgoing references (tag keys).
    pub fn with_references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references = references.into_iter().map(Into::into).collect();
        self
    }

    /// `CATEGORY:IDENTIFIER`
    pub fn key(&self) -> String {
        format_tag_key(&self.category, &self.identifier)
    }

    /// Family of this tag's category.
    pub fn family(&self) -> Option<CategoryFamily> {
        CategoryFamily::of(&self.category)
    }
}

impl fmt::Display for TagMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "@{} {}", self.key(), desc),
            None => write!(f, "@{}", self.key()),
        }
    }
}

/// 1-based line/column of a tag's `@`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// An ordered sequence of tags joined by the chain separator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagChain {
    pub tags: Vec<TagMatch>,
}

impl TagChain {
    pub fn new(tags: Vec<TagMatch>) -> Self {
        Self { tags }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Fraction of Primary categories present in the chain.
    pub fn completeness_score(&self) -> f64 {
        let present = PRIMARY_CHAIN
            .iter()
            .filter(|cat| self.tags.iter().any(|t| t.category == **cat))
            .count();
        present as f64 / PRIMARY_CHAIN.len() as f64
    }

    /// Consecutive `(source, target)` key pairs.
    pub fn links(&self) -> Vec<(String, String)> {
        self.tags
            .windows(2)
            .map(|pair| (pair[0].key(), pair[1].key()))
            .collect()
    }
}

/// A tag key occurring more than once in the same text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateTagInfo {
    pub key: String,
    pub positions: Vec<Position>,
}

impl DuplicateTagInfo {
    pub fn count(&self) -> usize {
        self.positions.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomies_differ_only_by_custom() {
        assert_eq!(PARSER_CATEGORIES.len(), 16);
        assert_eq!(STORAGE_CATEGORIES.len(), 17);
        for cat in PARSER_CATEGORIES {
            assert!(is_storage_category(cat));
        }
        assert!(is_storage_category("CUSTOM"));
        assert!(!is_parser_category("CUSTOM"));
    }

    #[test]
    fn test_family_lookup() {
        assert_eq!(CategoryFamily::of("REQ"), Some(CategoryFamily::Primary));
        assert_eq!(CategoryFamily::of("ADR"), Some(CategoryFamily::Steering));
        assert_eq!(CategoryFamily::of("UI"), Some(CategoryFamily::Implementation));
        assert_eq!(CategoryFamily::of("TAG"), Some(CategoryFamily::Quality));
        assert_eq!(CategoryFamily::of("CUSTOM"), None);

        let total: usize = CategoryFamily::ALL
            .iter()
            .map(|f| f.categories().len())
            .sum();
        assert_eq!(total, PARSER_CATEGORIES.len());
    }

    #[test]
    fn test_parse_tag_key() {
        assert_eq!(
            parse_tag_key("REQ:AUTH-001"),
            Some(TagKey::new("REQ", "AUTH-001"))
        );
        assert_eq!(
            parse_tag_key("@TEST:LOGIN"),
            Some(TagKey::new("TEST", "LOGIN"))
        );
        assert_eq!(parse_tag_key("REQAUTH"), None);
        assert_eq!(parse_tag_key(":AUTH"), None);
        assert_eq!(parse_tag_key("REQ:"), None);
        assert!("nonsense".parse::<TagKey>().is_err());
    }

    #[test]
    fn test_canonical_identifier() {
        assert!(is_canonical_identifier("AUTH-001"));
        assert!(is_canonical_identifier("A1"));
        assert!(!is_canonical_identifier("auth-001"));
        assert!(!is_canonical_identifier("AUTH-"));
        assert!(!is_canonical_identifier("-AUTH"));
        assert!(!is_canonical_identifier("A"));
    }

    #[test]
    fn test_chain_completeness_and_links() {
        let chain = TagChain::new(vec![
            TagMatch::new("REQ", "A"),
            TagMatch::new("DESIGN", "A"),
            TagMatch::new("TASK", "A"),
        ]);
        assert_eq!(chain.completeness_score(), 0.75);
        assert_eq!(
            chain.links(),
            vec![
                ("REQ:A".to_string(), "DESIGN:A".to_string()),
                ("DESIGN:A".to_string(), "TASK:A".to_string()),
            ]
        );
    }

    #[test]
    fn test_tag_match_display() {
        let tag = TagMatch::new("REQ", "AUTH-001").with_description("Login");
        assert_eq!(tag.to_string(), "@REQ:AUTH-001 Login");
        assert_eq!(TagMatch::new("TEST", "X1").to_string(), "@TEST:X1");
    }
}
