//! Traceability chain traversal.
//!
//! Starting from the first stored row of a tag key, follow outgoing
//! (forward) and/or incoming (backward) references and build a tree. A row
//! already on the current root-to-node path is not expanded again, so cycles
//! terminate; the same row can still appear under different branches.
//! Expansion stops at `max_depth` without error and sets `truncated`.

use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::SearchEngine;
use crate::store::crud::{find_by_key, get_references_by_source, get_references_by_target, get_tag_by_id};
use crate::store::{Result, StoredTag};
use crate::tags::parse_tag_key;

/// Default traversal depth.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Which references to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "forward" | "down" => Ok(Direction::Forward),
            "backward" | "up" => Ok(Direction::Backward),
            "both" => Ok(Direction::Both),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// How a node was reached from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainRelation {
    Root,
    /// Parent references this node.
    Forward,
    /// This node references the parent.
    Backward,
}

impl ChainRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainRelation::Root => "root",
            ChainRelation::Forward => "forward",
            ChainRelation::Backward => "backward",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNode {
    pub id: i64,
    pub key: String,
    pub category: String,
    pub identifier: String,
    pub description: Option<String>,
    pub file_path: String,
    pub line_number: u32,
    pub depth: usize,
    pub relation: ChainRelation,
    pub reference_type: Option<String>,
    pub children: Vec<ChainNode>,
}

impl ChainNode {
    fn from_tag(
        tag: StoredTag,
        depth: usize,
        relation: ChainRelation,
        reference_type: Option<String>,
    ) -> Self {
        Self {
            id: tag.id,
            key: tag.key(),
            category: tag.category,
            identifier: tag.identifier,
            description: tag.description,
            file_path: tag.file_path,
            line_number: tag.line_number,
            depth,
            relation,
            reference_type,
            children: Vec::new(),
        }
    }

    /// Deepest depth in this subtree.
    pub fn max_depth(&self) -> usize {
        self.children
            .iter()
            .map(ChainNode::max_depth)
            .max()
            .unwrap_or(self.depth)
    }

    /// Pre-order walk.
    pub fn walk<'n>(&'n self, out: &mut Vec<&'n ChainNode>) {
        out.push(self);
        for child in &self.children {
            child.walk(out);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceabilityChain {
    pub tag_key: String,
    pub found: bool,
    pub direction: Direction,
    pub max_depth: usize,
    pub root: Option<ChainNode>,
    pub node_count: usize,
    /// True when some node at `max_depth` had references left unexpanded.
    pub truncated: bool,
}

impl TraceabilityChain {
    fn not_found(tag_key: &str, direction: Direction, max_depth: usize) -> Self {
        Self {
            tag_key: tag_key.to_string(),
            found: false,
            direction,
            max_depth,
            root: None,
            node_count: 0,
            truncated: false,
        }
    }

    /// All nodes, pre-order.
    pub fn nodes(&self) -> Vec<&ChainNode> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.walk(&mut out);
        }
        out
    }
}

struct Traversal<'c> {
    conn: &'c Connection,
    max_depth: usize,
    path: Vec<i64>,
    node_count: usize,
    truncated: bool,
}

impl Traversal<'_> {
    fn neighbours(&self, id: i64, relation: ChainRelation) -> Result<Vec<(i64, String)>> {
        Ok(match relation {
            ChainRelation::Forward => get_references_by_source(self.conn, id)?
                .into_iter()
                .map(|r| (r.target_tag_id, r.reference_type))
                .collect(),
            ChainRelation::Backward => get_references_by_target(self.conn, id)?
                .into_iter()
                .map(|r| (r.source_tag_id, r.reference_type))
                .collect(),
            ChainRelation::Root => Vec::new(),
        })
    }

    fn expand(&mut self, node: &mut ChainNode, relations: &[ChainRelation]) -> Result<()> {
        self.path.push(node.id);

        for &relation in relations {
            for (next_id, reference_type) in self.neighbours(node.id, relation)? {
                if self.path.contains(&next_id) {
                    continue;
                }
                if node.depth >= self.max_depth {
                    self.truncated = true;
                    break;
                }
                let Some(tag) = get_tag_by_id(self.conn, next_id)? else {
                    continue;
                };
                let mut child =
                    ChainNode::from_tag(tag, node.depth + 1, relation, Some(reference_type));
                self.node_count += 1;
                // Children keep following the direction they were reached by
                self.expand(&mut child, &[relation])?;
                node.children.push(child);
            }
        }

        self.path.pop();
        Ok(())
    }
}

impl SearchEngine<'_> {
    /// Build the reference tree around a tag key.
    ///
    /// Unknown or malformed keys produce `found: false`.
    pub fn get_traceability_chain(
        &self,
        tag_key: &str,
        direction: Direction,
        max_depth: usize,
    ) -> Result<TraceabilityChain> {
        let Some(key) = parse_tag_key(tag_key) else {
            return Ok(TraceabilityChain::not_found(tag_key, direction, max_depth));
        };

        self.store().with_conn(|conn| {
            let Some(first) = find_by_key(conn, &key.category, &key.identifier)?
                .into_iter()
                .next()
            else {
                return Ok(TraceabilityChain::not_found(tag_key, direction, max_depth));
            };

            let relations: &[ChainRelation] = match direction {
                Direction::Forward => &[ChainRelation::Forward],
                Direction::Backward => &[ChainRelation::Backward],
                Direction::Both => &[ChainRelation::Forward, ChainRelation::Backward],
            };

            let mut root = ChainNode::from_tag(first, 0, ChainRelation::Root, None);
            let mut traversal = Traversal {
                conn,
                max_depth,
                path: Vec::new(),
                node_count: 1,
                truncated: false,
            };
            traversal.expand(&mut root, relations)?;

            Ok(TraceabilityChain {
                tag_key: key.to_string(),
                found: true,
                direction,
                max_depth,
                root: Some(root),
                node_count: traversal.node_count,
                truncated: traversal.truncated,
            })
        })
    }
}
