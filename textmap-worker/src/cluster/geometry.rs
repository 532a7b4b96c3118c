//! Bubble geometry
//!
//! Places internal nodes at the centroid of their leaf descendants, derives
//! one global radius scaling factor from the spacing of the top-level
//! bubbles, and computes the bounding box the client uses to fit the
//! initial viewport.

use super::{MapNode, ParentRef, MIN_ALLOWED_DISTANCE, MIN_RADIUS};
use serde::{Deserialize, Serialize};

/// Axis extent of the rendered map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min: f64,
    pub max: f64,
}

/// Bounding box and radius ceiling of the whole map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapMetadata {
    pub x: Extent,
    pub y: Extent,
    pub max_radius: f64,
}

/// Place every internal node at the centroid of its leaf descendants.
/// Leaves keep their reduced coordinates untouched.
pub fn assign_centroids(nodes: &mut [MapNode]) {
    for node in nodes {
        center_on_leaves(node);
    }
}

fn center_on_leaves(node: &mut MapNode) {
    if node.is_leaf() {
        return;
    }
    assign_centroids(&mut node.children);

    let mut sum = [0.0_f64; 2];
    let mut count = 0_usize;
    accumulate_leaves(&node.children, &mut sum, &mut count);
    if count > 0 {
        node.coord = [sum[0] / count as f64, sum[1] / count as f64];
    }
}

fn accumulate_leaves(nodes: &[MapNode], sum: &mut [f64; 2], count: &mut usize) {
    for node in nodes {
        if node.is_leaf() {
            sum[0] += node.coord[0];
            sum[1] += node.coord[1];
            *count += 1;
        } else {
            accumulate_leaves(&node.children, sum, count);
        }
    }
}

/// Global radius scaling factor from top-level bubble spacing.
///
/// For each top-level pair further apart than [`MIN_ALLOWED_DISTANCE`], the
/// factor that would make the two bubbles just touch is their distance over
/// the larger of the pair's unscaled radii; the minimum over all pairs keeps
/// every pair overlap-free. Closer pairs are ignored as co-located, and
/// leaf-only pairs (both unscaled radii zero) do not constrain the factor
/// since leaves take the minimum radius regardless. With no qualifying pair
/// the factor is 0 and every bubble falls back to the minimum radius.
pub fn radius_multiplier(top: &[MapNode]) -> f64 {
    let mut factor = f64::INFINITY;
    for i in 0..top.len() {
        for j in (i + 1)..top.len() {
            let d = distance(top[i].coord, top[j].coord);
            if d <= MIN_ALLOWED_DISTANCE {
                continue;
            }
            let unscaled = unscaled_radius(&top[i]).max(unscaled_radius(&top[j]));
            if unscaled == 0.0 {
                continue;
            }
            factor = factor.min(d / unscaled);
        }
    }
    if factor.is_finite() {
        factor
    } else {
        0.0
    }
}

/// Set every node's radius: internal nodes scale with the square root of
/// their descendant count, leaves stay at the minimum.
pub fn assign_radii(nodes: &mut [MapNode], multiplier: f64) {
    for node in nodes {
        node.radius = if node.is_leaf() {
            MIN_RADIUS
        } else {
            (unscaled_radius(node) * multiplier).max(MIN_RADIUS)
        };
        assign_radii(&mut node.children, multiplier);
    }
}

fn unscaled_radius(node: &MapNode) -> f64 {
    (node.children_count as f64).sqrt()
}

/// Stamp each child with its parent's render info. Top-level nodes keep no
/// parent reference. Run after centroids and radii are final.
pub fn assign_parent_refs(nodes: &mut [MapNode]) {
    for node in nodes {
        let parent = ParentRef {
            coord: node.coord,
            radius: node.radius,
            node_id: node.node_id.clone(),
        };
        for child in &mut node.children {
            child.parent = Some(parent.clone());
        }
        assign_parent_refs(&mut node.children);
    }
}

/// Bounding box over every node's bubble, plus the largest radius.
pub fn compute_metadata(nodes: &[MapNode]) -> MapMetadata {
    let mut meta = MapMetadata {
        x: Extent { min: 0.0, max: 0.0 },
        y: Extent { min: 0.0, max: 0.0 },
        max_radius: 0.0,
    };
    if nodes.is_empty() {
        return meta;
    }
    meta.x = Extent {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };
    meta.y = meta.x;
    extend_metadata(nodes, &mut meta);
    meta
}

fn extend_metadata(nodes: &[MapNode], meta: &mut MapMetadata) {
    for node in nodes {
        meta.x.min = meta.x.min.min(node.coord[0] - node.radius);
        meta.x.max = meta.x.max.max(node.coord[0] + node.radius);
        meta.y.min = meta.y.min.min(node.coord[1] - node.radius);
        meta.y.max = meta.y.max.max(node.coord[1] + node.radius);
        meta.max_radius = meta.max_radius.max(node.radius);
        extend_metadata(&node.children, meta);
    }
}

fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::test_support::{node, node_with_children};
    use crate::cluster::tree::assign_children_counts;

    #[test]
    fn internal_nodes_move_to_leaf_centroid() {
        let mut level = vec![node_with_children(
            [99.0, 99.0],
            vec![
                node([0.0, 0.0]),
                node([4.0, 0.0]),
                node_with_children([50.0, 50.0], vec![node([2.0, 6.0]), node([2.0, 2.0])]),
            ],
        )];
        assign_centroids(&mut level);
        // Four leaves: (0,0) (4,0) (2,6) (2,2)
        assert_eq!(level[0].coord, [2.0, 2.0]);
        assert_eq!(level[0].children[2].coord, [2.0, 4.0]);
        // Leaves are untouched
        assert_eq!(level[0].children[0].coord, [0.0, 0.0]);
    }

    #[test]
    fn multiplier_keeps_closest_qualifying_pair_touching() {
        let mut level = vec![
            node_with_children([0.0, 0.0], vec![node([0.0, 0.0]); 4]),
            node_with_children([10.0, 0.0], vec![node([10.0, 0.0]); 9]),
        ];
        assign_children_counts(&mut level);
        // distance 10, larger unscaled radius sqrt(9) = 3
        let factor = radius_multiplier(&level);
        assert!((factor - 10.0 / 3.0).abs() < 1e-9);

        assign_radii(&mut level, factor);
        assert!((level[0].radius - 2.0 * factor).abs() < 1e-9);
        assert!((level[1].radius - 10.0).abs() < 1e-9);
        // Every leaf gets the floor radius
        assert_eq!(level[0].children[0].radius, MIN_RADIUS);
    }

    #[test]
    fn leaf_pairs_do_not_cap_the_multiplier() {
        // Two internal bubbles set the scale; the distant leaf pair must
        // not drag the factor down to their own spacing
        let mut level = vec![
            node_with_children([0.0, 0.0], vec![node([0.0, 0.0]); 4]),
            node_with_children([100.0, 0.0], vec![node([100.0, 0.0]); 4]),
            node([0.0, 200.0]),
            node([2.0, 200.0]),
        ];
        assign_children_counts(&mut level);

        // internal-internal: 100 / sqrt(4) = 50; internal-leaf pairs are
        // farther relative to sqrt(4); the leaf-leaf pair (distance 2) is
        // skipped entirely
        let factor = radius_multiplier(&level);
        assert!((factor - 50.0).abs() < 1e-9);
    }

    #[test]
    fn co_located_bubbles_yield_zero_multiplier() {
        let level = vec![node([0.0, 0.0]), node([0.5, 0.0])];
        assert_eq!(radius_multiplier(&level), 0.0);

        let mut level = level;
        assign_radii(&mut level, 0.0);
        assert!(level.iter().all(|n| n.radius == MIN_RADIUS));
    }

    #[test]
    fn single_top_node_has_no_pairs() {
        let level = vec![node([3.0, 3.0])];
        assert_eq!(radius_multiplier(&level), 0.0);
    }

    #[test]
    fn parent_refs_carry_final_geometry() {
        let mut level = vec![node_with_children(
            [1.0, 2.0],
            vec![node([0.0, 0.0]), node([2.0, 4.0])],
        )];
        level[0].radius = 7.0;
        assign_parent_refs(&mut level);

        assert!(level[0].parent.is_none());
        let parent = level[0].children[0].parent.as_ref().unwrap();
        assert_eq!(parent.coord, [1.0, 2.0]);
        assert_eq!(parent.radius, 7.0);
        assert_eq!(parent.node_id, level[0].node_id);
    }

    #[test]
    fn metadata_covers_bubbles_not_just_centers() {
        let mut level = vec![node([-5.0, 0.0]), node([5.0, 1.0])];
        level[0].radius = 2.0;
        level[1].radius = 3.0;
        let meta = compute_metadata(&level);
        assert_eq!(meta.x, Extent { min: -7.0, max: 8.0 });
        assert_eq!(meta.y, Extent { min: -2.0, max: 4.0 });
        assert_eq!(meta.max_radius, 3.0);
    }

    #[test]
    fn empty_map_has_zero_metadata() {
        let meta = compute_metadata(&[]);
        assert_eq!(meta.x, Extent { min: 0.0, max: 0.0 });
        assert_eq!(meta.max_radius, 0.0);
    }
}
