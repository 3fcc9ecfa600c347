//! Structural analysis over parsed tags.
//!
//! Every check works on an in-memory `&[TagMatch]` whose `references` lists
//! carry outgoing tag keys. Nothing here touches the store and nothing here
//! fails: malformed input simply shows up in the returned reports.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::tags::{
    is_canonical_identifier, parse_tag_key, CategoryFamily, TagMatch, PRIMARY_CHAIN,
};

/// Result of checking the Primary chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainValidation {
    pub is_valid: bool,
    pub completeness_score: f64,
    pub missing_categories: Vec<String>,
}

/// An identifier that does not follow the uppercase-hyphen convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyViolation {
    pub key: String,
    pub identifier: String,
    pub message: String,
    /// Canonical spelling, when one can be derived.
    pub suggestion: Option<String>,
}

/// A reference whose target cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenReference {
    pub source: String,
    pub target: String,
    pub reason: String,
}

/// Everything the validator knows about a tag set.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub total_tags: usize,
    pub unique_keys: usize,
    pub primary_chain: ChainValidation,
    pub cycles: Vec<Vec<String>>,
    pub self_references: Vec<String>,
    pub orphans: Vec<String>,
    pub naming_violations: Vec<ConsistencyViolation>,
    pub coverage: BTreeMap<CategoryFamily, f64>,
    pub broken_references: Vec<BrokenReference>,
}

impl AnalysisReport {
    /// No cycles, broken references, self references or naming violations.
    pub fn is_healthy(&self) -> bool {
        self.cycles.is_empty()
            && self.self_references.is_empty()
            && self.broken_references.is_empty()
            && self.naming_violations.is_empty()
    }
}

/// Check that all four Primary categories are present.
pub fn validate_primary_chain(tags: &[TagMatch]) -> ChainValidation {
    let present: HashSet<&str> = tags.iter().map(|t| t.category.as_str()).collect();
    let missing_categories: Vec<String> = PRIMARY_CHAIN
        .iter()
        .filter(|cat| !present.contains(**cat))
        .map(|cat| cat.to_string())
        .collect();

    let found = PRIMARY_CHAIN.len() - missing_categories.len();
    ChainValidation {
        is_valid: missing_categories.is_empty(),
        completeness_score: found as f64 / PRIMARY_CHAIN.len() as f64,
        missing_categories,
    }
}

/// Reference graph keyed by tag key. Duplicate keys merge their edges and the
/// first occurrence represents the node.
struct KeyGraph<'a> {
    order: Vec<String>,
    nodes: HashMap<String, &'a TagMatch>,
    edges: HashMap<String, Vec<String>>,
}

impl<'a> KeyGraph<'a> {
    fn build(tags: &'a [TagMatch]) -> Self {
        let mut order = Vec::new();
        let mut nodes = HashMap::new();
        let mut edges: HashMap<String, Vec<String>> = HashMap::new();

        for tag in tags {
            let key = tag.key();
            if !nodes.contains_key(&key) {
                order.push(key.clone());
                nodes.insert(key.clone(), tag);
            }
            let out = edges.entry(key).or_default();
            for target in &tag.references {
                if !out.contains(target) {
                    out.push(target.clone());
                }
            }
        }

        Self { order, nodes, edges }
    }

    fn neighbours(&self, key: &str) -> &[String] {
        self.edges.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Find reference cycles.
///
/// A depth-first search starts from every node with its own visited set and
/// path stack. When an edge reaches a node on the stack, the stack slice
/// from that node onward is a cycle. The same cycle found from different
/// starting points is reported once.
pub fn detect_circular_references(tags: &[TagMatch]) -> Vec<Vec<TagMatch>> {
    let graph = KeyGraph::build(tags);
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut cycles = Vec::new();

    for root in &graph.order {
        let mut visited: HashSet<String> = HashSet::new();
        find_cycles(&graph, root, &mut visited, &mut |cycle| {
            if seen.insert(canonical_rotation(&cycle)) {
                cycles.push(
                    cycle
                        .iter()
                        .filter_map(|k| graph.nodes.get(k).map(|t| (*t).clone()))
                        .collect(),
                );
            }
        });
    }

    cycles
}

/// Iterative DFS from `root`. Each frame is a key on the current path plus
/// the index of the next neighbour to try, so path length is bounded by heap
/// rather than by the thread stack.
fn find_cycles<'g>(
    graph: &'g KeyGraph<'_>,
    root: &'g str,
    visited: &mut HashSet<String>,
    on_cycle: &mut dyn FnMut(Vec<String>),
) {
    let mut path: Vec<&'g str> = vec![root];
    let mut on_path: HashMap<&'g str, usize> = HashMap::from([(root, 0)]);
    let mut frames: Vec<usize> = vec![0];
    visited.insert(root.to_string());

    while let (Some(&key), Some(next_idx)) = (path.last(), frames.last_mut()) {
        let Some(next) = graph.neighbours(key).get(*next_idx) else {
            on_path.remove(key);
            path.pop();
            frames.pop();
            continue;
        };
        *next_idx += 1;

        let next = next.as_str();
        if !graph.nodes.contains_key(next) {
            continue;
        }
        if let Some(&pos) = on_path.get(next) {
            on_cycle(path[pos..].iter().map(|k| k.to_string()).collect());
        } else if visited.insert(next.to_string()) {
            on_path.insert(next, path.len());
            path.push(next);
            frames.push(0);
        }
    }
}

fn canonical_rotation(cycle: &[String]) -> Vec<String> {
    let Some(min_pos) = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    cycle[min_pos..]
        .iter()
        .chain(cycle[..min_pos].iter())
        .cloned()
        .collect()
}

/// Tags that list their own key among their references.
pub fn detect_self_references(tags: &[TagMatch]) -> Vec<TagMatch> {
    tags.iter()
        .filter(|t| {
            let key = t.key();
            t.references.iter().any(|r| *r == key)
        })
        .cloned()
        .collect()
}

/// Tags with no outgoing references that no other tag points to.
pub fn find_orphaned_tags(tags: &[TagMatch]) -> Vec<TagMatch> {
    let referenced: HashSet<&str> = tags
        .iter()
        .flat_map(|t| t.references.iter().map(String::as_str))
        .collect();

    tags.iter()
        .filter(|t| t.references.is_empty() && !referenced.contains(t.key().as_str()))
        .cloned()
        .collect()
}

/// Flag identifiers that are not uppercase-hyphen canonical.
pub fn check_naming_consistency(tags: &[TagMatch]) -> Vec<ConsistencyViolation> {
    let mut seen = HashSet::new();
    let mut violations = Vec::new();

    for tag in tags {
        if is_canonical_identifier(&tag.identifier) || !seen.insert(tag.key()) {
            continue;
        }
        let candidate = tag
            .identifier
            .to_uppercase()
            .replace('_', "-")
            .trim_matches('-')
            .to_string();
        let suggestion = is_canonical_identifier(&candidate).then_some(candidate);

        violations.push(ConsistencyViolation {
            key: tag.key(),
            identifier: tag.identifier.clone(),
            message: format!(
                "identifier '{}' should be uppercase letters, digits and inner hyphens",
                tag.identifier
            ),
            suggestion,
        });
    }

    violations
}

/// Fraction of each family's categories that occur at least once.
pub fn calculate_tag_coverage(tags: &[TagMatch]) -> BTreeMap<CategoryFamily, f64> {
    let present: HashSet<&str> = tags.iter().map(|t| t.category.as_str()).collect();

    CategoryFamily::ALL
        .into_iter()
        .map(|family| {
            let cats = family.categories();
            let hit = cats.iter().filter(|c| present.contains(**c)).count();
            (family, hit as f64 / cats.len() as f64)
        })
        .collect()
}

/// Every referenced key must belong to some tag in the collection.
pub fn validate_reference_integrity(tags: &[TagMatch]) -> Vec<BrokenReference> {
    let known: HashSet<String> = tags.iter().map(TagMatch::key).collect();
    let mut broken = Vec::new();

    for tag in tags {
        for target in &tag.references {
            let reason = if parse_tag_key(target).is_none() {
                "malformed reference key"
            } else if !known.contains(target) {
                "target does not exist"
            } else {
                continue;
            };
            broken.push(BrokenReference {
                source: tag.key(),
                target: target.clone(),
                reason: reason.to_string(),
            });
        }
    }

    broken
}

/// Run every check and collect the results.
pub fn analyze(tags: &[TagMatch]) -> AnalysisReport {
    let unique: HashSet<String> = tags.iter().map(TagMatch::key).collect();
    let keys = |list: Vec<TagMatch>| list.iter().map(TagMatch::key).collect::<Vec<_>>();

    AnalysisReport {
        total_tags: tags.len(),
        unique_keys: unique.len(),
        primary_chain: validate_primary_chain(tags),
        cycles: detect_circular_references(tags)
            .into_iter()
            .map(keys)
            .collect(),
        self_references: keys(detect_self_references(tags)),
        orphans: keys(find_orphaned_tags(tags)),
        naming_violations: check_naming_consistency(tags),
        coverage: calculate_tag_coverage(tags),
        broken_references: validate_reference_integrity(tags),
    }
}
