//! Hierarchical clustering pipeline
//!
//! Turns a job's embedded texts into a nested bubble tree:
//! dimensionality reduction -> exemplar clustering -> tree nesting ->
//! geometry -> keyword aggregation -> summary extraction -> serialization.
//! The stages are pure functions over [`MapNode`] trees; the `cluster_texts`
//! task wires them together and records progress between stages.

pub mod affinity;
pub mod geometry;
pub mod keywords;
pub mod serialize;
pub mod summary;
pub mod tree;
pub mod tsne;

use crate::texts::EmbeddedText;
use keywords::Keyword;
use textmap_common::db::models::TokenItem;
use uuid::Uuid;

/// Minimum bubble radius; also the radius of every leaf
pub const MIN_RADIUS: f64 = 1.0;

/// Sibling pairs closer than this are ignored when deriving the global
/// radius scaling factor
pub const MIN_ALLOWED_DISTANCE: f64 = 1.0;

/// One node of the in-memory bubble tree, built fresh per clustering run.
/// A parent exclusively owns its children; the `parent` back-reference only
/// carries the parent's render info, not ownership.
#[derive(Debug, Clone)]
pub struct MapNode {
    /// Fresh render identity, distinct from the text id
    pub node_id: String,
    /// Backing text row, when the node represents a stored text
    pub text_id: Option<String>,
    pub text: Option<String>,
    /// Ranked tokens of the backing text; feeds keyword aggregation
    pub tokens: Vec<TokenItem>,
    /// 2-D coordinate from dimensionality reduction (leaves) or the
    /// centroid of leaf descendants (internal nodes)
    pub coord: [f64; 2],
    pub is_exemplar: bool,
    pub cluster_label: usize,
    pub children: Vec<MapNode>,
    /// Number of descendants strictly beneath this node
    pub children_count: usize,
    pub radius: f64,
    pub parent: Option<ParentRef>,
    pub keywords: Vec<Keyword>,
    pub sentences: Vec<String>,
}

/// Parent render info stamped into every non-root node
#[derive(Debug, Clone)]
pub struct ParentRef {
    pub coord: [f64; 2],
    pub radius: f64,
    pub node_id: String,
}

impl MapNode {
    /// Leaf node for one embedded text placed at its reduced coordinate
    pub fn leaf(item: &EmbeddedText, coord: [f64; 2]) -> Self {
        Self {
            node_id: Uuid::new_v4().to_string(),
            text_id: Some(item.id.clone()),
            text: Some(item.body.clone()),
            tokens: item.tokens.clone(),
            coord,
            is_exemplar: false,
            cluster_label: 0,
            children: Vec::new(),
            children_count: 0,
            radius: MIN_RADIUS,
            parent: None,
            keywords: Vec::new(),
            sentences: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Root of a finished bubble tree plus its bounding-box metadata
#[derive(Debug, Clone)]
pub struct BubbleTree {
    pub children: Vec<MapNode>,
    pub metadata: geometry::MapMetadata,
}
