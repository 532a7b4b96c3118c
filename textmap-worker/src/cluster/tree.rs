//! Tree nesting
//!
//! Groups a flat level of nodes into exemplar-headed subtrees using the
//! clustering labels, and optionally re-clusters levels that came out too
//! wide. An exemplar that becomes an internal node keeps a leaf copy of
//! itself as its first child so the underlying text remains visible when
//! zoomed in.

use super::affinity::affinity_propagation;
use super::MapNode;
use uuid::Uuid;

/// Cluster one level of sibling nodes into exemplar-headed groups.
///
/// Degenerate case: when the whole level converges on a single exemplar,
/// nesting would produce one node wrapping everything, so the level is
/// returned flat (sorted, labeled) instead.
pub fn cluster_level(mut items: Vec<MapNode>) -> Vec<MapNode> {
    if items.len() < 2 {
        return items;
    }

    let coords: Vec<Vec<f64>> = items.iter().map(|n| n.coord.to_vec()).collect();
    let clustering = affinity_propagation(&coords);
    for (i, node) in items.iter_mut().enumerate() {
        node.cluster_label = clustering.labels[i];
        node.is_exemplar = clustering.exemplars.contains(&i);
    }

    // Exemplar first within each label group
    items.sort_by_key(|n| (n.cluster_label, !n.is_exemplar));

    if clustering.cluster_count() < 2 {
        return items;
    }

    let mut level: Vec<MapNode> = Vec::with_capacity(clustering.cluster_count());
    for node in items {
        if node.is_exemplar {
            level.push(into_group_head(node));
        } else if let Some(head) = level.last_mut() {
            head.children.push(node);
        } else {
            // Sort order guarantees the exemplar leads its group; a member
            // without a head would mean the labeling is broken
            level.push(node);
        }
    }

    // A group holding only the exemplar's own copy gains nothing from
    // nesting; collapse it back to a leaf
    for head in &mut level {
        if head.children.len() <= 1 {
            head.children.clear();
        }
    }
    level
}

/// Promote an exemplar to a group head, keeping a leaf copy of it as the
/// first child. Exemplars that already head a subtree are left as-is.
fn into_group_head(mut node: MapNode) -> MapNode {
    if node.children.is_empty() {
        let mut own_copy = node.clone();
        own_copy.node_id = Uuid::new_v4().to_string();
        node.children.push(own_copy);
    }
    node
}

/// Re-cluster every level wider than `max_breadth`, top down.
pub fn break_down_wide_levels(mut nodes: Vec<MapNode>, max_breadth: usize) -> Vec<MapNode> {
    if nodes.len() > max_breadth {
        nodes = cluster_level(nodes);
    }
    for node in &mut nodes {
        let children = std::mem::take(&mut node.children);
        node.children = break_down_wide_levels(children, max_breadth);
    }
    nodes
}

/// Fill in `children_count` (descendants strictly beneath each node),
/// bottom up. Returns the total descendant count of the level.
pub fn assign_children_counts(nodes: &mut [MapNode]) -> usize {
    let mut total = 0;
    for node in nodes {
        node.children_count = assign_children_counts(&mut node.children);
        total += 1 + node.children_count;
    }
    total
}
