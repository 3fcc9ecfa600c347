//! Tag Parser
//!
//! Extracts `@CATEGORY:IDENTIFIER[ description]` annotations from raw text.
//!
//! ## Grammar
//!
//! - The head is `@`, an uppercase category, `:` and an identifier token
//!   `[A-Z0-9][A-Z0-9_-]*`.
//! - The description runs to the end of the line, stopping early at the chain
//!   arrow `→` or at the next tag head on the same line. It is trimmed; an
//!   empty description is `None`.
//! - Only categories from [`PARSER_CATEGORIES`] produce matches. Heads with
//!   other categories are skipped, but still terminate a preceding description.
//!
//! All functions are pure and safe to call from any thread.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::tags::{
    is_parser_category, DuplicateTagInfo, Position, TagChain, TagMatch, CHAIN_SEPARATOR,
    PARSER_CATEGORIES,
};

static TAG_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([A-Z]+):([A-Z0-9][A-Z0-9_-]*)").expect("tag head pattern is valid"));

static WHOLE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@([A-Z]+):([A-Z0-9][A-Z0-9_-]*)(?:\s+[^\r\n]*)?$")
        .expect("whole tag pattern is valid")
});

/// A head match within one line, before taxonomy filtering.
struct RawHead<'a> {
    category: &'a str,
    identifier: &'a str,
    start: usize,
    end: usize,
}

fn raw_heads(line: &str) -> Vec<RawHead<'_>> {
    TAG_HEAD
        .captures_iter(line)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(RawHead {
                category: caps.get(1)?.as_str(),
                identifier: caps.get(2)?.as_str(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

fn description_between(line: &str, from: usize, next_head: Option<usize>) -> Option<String> {
    let mut end = next_head.unwrap_or(line.len());
    if let Some(arrow) = line[from..end].find(CHAIN_SEPARATOR) {
        end = from + arrow;
    }
    let desc = line[from..end].trim();
    if desc.is_empty() {
        None
    } else {
        Some(desc.to_string())
    }
}

/// Parse every valid tag on a single line, with the byte offset of its `@`.
fn parse_line(line: &str) -> Vec<(TagMatch, usize)> {
    let heads = raw_heads(line);
    let mut out = Vec::new();

    for (i, head) in heads.iter().enumerate() {
        if !is_parser_category(head.category) {
            continue;
        }
        let next_start = heads.get(i + 1).map(|h| h.start);
        let mut tag = TagMatch::new(head.category, head.identifier);
        tag.description = description_between(line, head.end, next_start);
        out.push((tag, head.start));
    }

    out
}

/// Extract all valid tags from text, in order of appearance.
pub fn extract_tags(text: &str) -> Vec<TagMatch> {
    text.lines()
        .flat_map(|line| parse_line(line).into_iter().map(|(tag, _)| tag))
        .collect()
}

/// Extract all valid tags together with their 1-based line and column.
///
/// Columns count characters, not bytes.
pub fn extract_tags_with_positions(text: &str) -> Vec<(TagMatch, Position)> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        for (tag, offset) in parse_line(line) {
            let column = line[..offset].chars().count() + 1;
            out.push((tag, Position::new(idx + 1, column)));
        }
    }
    out
}

/// Find tag chains: `@A:X → @B:Y → @C:Z`.
///
/// Each line containing the arrow is split into segments; the first valid tag
/// of each segment is a chain link. A segment without a valid tag breaks the
/// chain. Only runs of two or more tags are returned.
pub fn parse_tag_chains(text: &str) -> Vec<TagChain> {
    let mut chains = Vec::new();

    for line in text.lines().filter(|l| l.contains(CHAIN_SEPARATOR)) {
        let mut current: Vec<TagMatch> = Vec::new();

        for segment in line.split(CHAIN_SEPARATOR) {
            // The first segment contributes its last tag, so prose such as
            // "see @REQ:A, @REQ:B → @DESIGN:B" links REQ:B.
            let tags = parse_line(segment);
            let link = if current.is_empty() {
                tags.into_iter().last()
            } else {
                tags.into_iter().next()
            };

            match link {
                Some((tag, _)) => current.push(tag),
                None => {
                    if current.len() >= 2 {
                        chains.push(TagChain::new(std::mem::take(&mut current)));
                    } else {
                        current.clear();
                    }
                }
            }
        }

        if current.len() >= 2 {
            chains.push(TagChain::new(current));
        }
    }

    chains
}

/// Check that a whole string is exactly one well-formed tag of a known category.
pub fn validate_tag_format(s: &str) -> bool {
    let s = s.trim();
    match WHOLE_TAG.captures(s) {
        Some(caps) => caps
            .get(1)
            .is_some_and(|cat| PARSER_CATEGORIES.contains(&cat.as_str())),
        None => false,
    }
}

/// Report every tag key that occurs more than once, sorted by key.
pub fn find_duplicate_tags(text: &str) -> Vec<DuplicateTagInfo> {
    let mut by_key: BTreeMap<String, Vec<Position>> = BTreeMap::new();
    for (tag, pos) in extract_tags_with_positions(text) {
        by_key.entry(tag.key()).or_default().push(pos);
    }

    by_key
        .into_iter()
        .filter(|(_, positions)| positions.len() > 1)
        .map(|(key, positions)| DuplicateTagInfo { key, positions })
        .collect()
}
