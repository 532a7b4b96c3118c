//! Keyword aggregation
//!
//! Every leaf contributes its single most similar token; internal nodes
//! merge their children's keywords by stemmed form, summing counts and
//! relevance, so zooming out shows progressively broader themes. A second
//! pass scatters draw positions inside each bubble with seeded Gaussian
//! jitter so labels do not stack on the center.

use super::MapNode;
use crate::nlp::pruned_stem;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An aggregated keyword of a bubble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub keyword: String,
    pub count: u64,
    /// Summed embedding similarity of the merged occurrences
    pub relevance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draw: Option<KeywordDraw>,
}

/// Where and how large the client renders one keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordDraw {
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
}

/// Fill in `keywords` for every node in the level, bottom up.
pub fn aggregate_keywords(nodes: &mut [MapNode]) {
    for node in nodes {
        if node.is_leaf() {
            node.keywords = leaf_keywords(node);
        } else {
            aggregate_keywords(&mut node.children);
            let merged: Vec<Keyword> = node
                .children
                .iter()
                .flat_map(|c| c.keywords.iter().cloned())
                .collect();
            node.keywords = group_keywords_by_count(merged);
        }
    }
}

/// A leaf's keyword is the stemmed form of its best-ranked token.
fn leaf_keywords(node: &MapNode) -> Vec<Keyword> {
    let Some(top) = node.tokens.first() else {
        return Vec::new();
    };
    let stem = pruned_stem(&top.token);
    if stem.trim().is_empty() {
        return Vec::new();
    }
    vec![Keyword {
        keyword: stem,
        count: 1,
        relevance: round2(top.similarity),
        draw: None,
    }]
}

/// Merge keywords by stemmed form, then order by count and relevance,
/// both descending. First-seen order breaks remaining ties.
pub fn group_keywords_by_count(keywords: Vec<Keyword>) -> Vec<Keyword> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, Keyword> = HashMap::new();
    for kw in keywords {
        match merged.get_mut(&kw.keyword) {
            Some(existing) => {
                existing.count += kw.count;
                existing.relevance += kw.relevance;
            }
            None => {
                order.push(kw.keyword.clone());
                merged.insert(kw.keyword.clone(), kw);
            }
        }
    }

    let mut grouped: Vec<Keyword> = order
        .into_iter()
        .filter_map(|k| merged.remove(&k))
        .map(|mut kw| {
            kw.relevance = round2(kw.relevance);
            kw.draw = None;
            kw
        })
        .collect();
    grouped.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.relevance.total_cmp(&a.relevance))
    });
    grouped
}

/// Scatter draw positions around each bubble's center. Seed the generator
/// per job so re-runs of the same clustering draw identically.
pub fn assign_draw_positions(nodes: &mut [MapNode], rng: &mut StdRng) {
    for node in nodes {
        // Spread scales with the bubble so labels stay inside it
        let spread = (node.radius / 3.0).max(f64::MIN_POSITIVE);
        if let Ok(jitter) = Normal::new(0.0, spread) {
            for kw in &mut node.keywords {
                kw.draw = Some(KeywordDraw {
                    x: node.coord[0] + jitter.sample(rng),
                    y: node.coord[1] + jitter.sample(rng),
                    font_size: font_size(kw),
                });
            }
        }
        assign_draw_positions(&mut node.children, rng);
    }
}

/// Log-scaled font size: frequent, relevant keywords grow slowly instead
/// of dwarfing the rest.
fn font_size(kw: &Keyword) -> f64 {
    let weight = (kw.count as f64) * (kw.relevance * 10.0).round();
    round2(1.0 + weight.max(1.0).ln())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::test_support::{node, node_with_children};
    use rand::SeedableRng;
    use textmap_common::db::models::TokenItem;

    fn kw(keyword: &str, count: u64, relevance: f64) -> Keyword {
        Keyword {
            keyword: keyword.to_string(),
            count,
            relevance,
            draw: None,
        }
    }

    fn leaf_with_token(token: &str, similarity: f64) -> crate::cluster::MapNode {
        let mut n = node([0.0, 0.0]);
        n.tokens = vec![
            TokenItem {
                token: token.to_string(),
                similarity,
            },
            TokenItem {
                token: "ignored".to_string(),
                similarity: 0.01,
            },
        ];
        n
    }

    #[test]
    fn repeated_keyword_sums_count_and_relevance() {
        // Eight mentions of "cable" at varying relevance among singleton
        // stems; the merged entry leads with the summed relevance and the
        // singletons follow by relevance, first seen first on ties
        let leaves: Vec<_> = [
            ("cables", 0.39),
            ("Cable!", 0.30),
            ("snap-on", 0.44),
            ("cable", 0.23),
            ("cable", 0.35),
            ("Cable", 0.35),
            ("copper", 0.39),
            ("cable", 0.43),
            ("cable!", 0.35),
            ("cable", 0.43),
            ("cable", 0.28),
            ("cabled", 0.39),
        ]
        .iter()
        .map(|(token, similarity)| leaf_with_token(token, *similarity))
        .collect();
        let mut level = vec![node_with_children([0.0, 0.0], leaves)];
        aggregate_keywords(&mut level);

        let merged: Vec<(&str, u64, f64)> = level[0]
            .keywords
            .iter()
            .map(|k| (k.keyword.as_str(), k.count, k.relevance))
            .collect();
        assert_eq!(
            merged,
            [
                ("cable", 8, 2.72),
                ("snapon", 1, 0.44),
                ("cables", 1, 0.39),
                ("copper", 1, 0.39),
                ("cabled", 1, 0.39),
            ]
        );
    }

    #[test]
    fn grouping_sorts_by_count_then_relevance() {
        let grouped = group_keywords_by_count(vec![
            kw("rare", 1, 0.9),
            kw("common", 1, 0.2),
            kw("common", 1, 0.2),
            kw("strong", 1, 0.5),
            kw("strong", 1, 0.5),
        ]);
        let names: Vec<&str> = grouped.iter().map(|k| k.keyword.as_str()).collect();
        assert_eq!(names, ["strong", "common", "rare"]);
        assert_eq!(grouped[0].relevance, 1.0);
        assert_eq!(grouped[1].count, 2);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let grouped = group_keywords_by_count(vec![kw("beta", 1, 0.3), kw("alpha", 1, 0.3)]);
        let names: Vec<&str> = grouped.iter().map(|k| k.keyword.as_str()).collect();
        assert_eq!(names, ["beta", "alpha"]);
    }

    #[test]
    fn tokenless_leaf_has_no_keywords() {
        let mut level = vec![node([0.0, 0.0])];
        aggregate_keywords(&mut level);
        assert!(level[0].keywords.is_empty());
    }

    #[test]
    fn draw_positions_are_seeded_and_deterministic() {
        let build = || {
            let mut level = vec![node_with_children(
                [5.0, 5.0],
                vec![leaf_with_token("copper", 0.4), leaf_with_token("copper", 0.4)],
            )];
            level[0].radius = 6.0;
            aggregate_keywords(&mut level);
            let mut rng = StdRng::seed_from_u64(7);
            assign_draw_positions(&mut level, &mut rng);
            level
        };
        let a = build();
        let b = build();
        let draw_a = a[0].keywords[0].draw.clone().unwrap();
        let draw_b = b[0].keywords[0].draw.clone().unwrap();
        assert_eq!(draw_a, draw_b);
        assert!(draw_a.font_size >= 1.0);
    }
}
