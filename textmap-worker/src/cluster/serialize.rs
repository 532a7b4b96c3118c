//! Map artifact shape
//!
//! The client-facing form of a finished bubble tree. Flat x/y fields
//! instead of coordinate arrays, every node carrying its parent's render
//! info (top-level nodes fall back to their own, with no parent id), and
//! bounding-box metadata alongside the root children.

use super::geometry::MapMetadata;
use super::keywords::Keyword;
use super::{BubbleTree, MapNode};
use serde::{Deserialize, Serialize};

/// Serialized map, the exact JSON stored in the artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapTree {
    pub children: Vec<MapNodeOut>,
    pub metadata: MapMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapNodeOut {
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub x: f64,
    pub y: f64,
    pub cluster_label: usize,
    pub children_count: usize,
    pub radius: f64,
    pub parent: ParentOut,
    pub keywords: Vec<Keyword>,
    pub sentences: Vec<String>,
    pub children: Vec<MapNodeOut>,
}

/// Parent render info; `node_id` is absent on top-level nodes, whose
/// x/y/radius mirror their own
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentOut {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

/// Reshape a finished tree into its artifact form.
pub fn reshape(tree: &BubbleTree) -> MapTree {
    MapTree {
        children: tree.children.iter().map(reshape_node).collect(),
        metadata: tree.metadata,
    }
}

fn reshape_node(node: &MapNode) -> MapNodeOut {
    let parent = match &node.parent {
        Some(p) => ParentOut {
            x: p.coord[0],
            y: p.coord[1],
            radius: p.radius,
            node_id: Some(p.node_id.clone()),
        },
        None => ParentOut {
            x: node.coord[0],
            y: node.coord[1],
            radius: node.radius,
            node_id: None,
        },
    };
    MapNodeOut {
        node_id: node.node_id.clone(),
        text_id: node.text_id.clone(),
        text: node.text.clone(),
        x: node.coord[0],
        y: node.coord[1],
        cluster_label: node.cluster_label,
        children_count: node.children_count,
        radius: node.radius,
        parent,
        keywords: node.keywords.clone(),
        sentences: node.sentences.clone(),
        children: node.children.iter().map(reshape_node).collect(),
    }
}
