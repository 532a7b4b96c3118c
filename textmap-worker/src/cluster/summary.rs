//! Extractive summarization
//!
//! Each internal node is summarized by the exemplar sentences of the
//! largest sentence clusters among its leaf descendants. No text is ever
//! generated; summaries are always verbatim sentences from the corpus.
//! Sentences without a stored embedding are skipped by the clustering path,
//! and very small sentence sets are used directly.

use super::affinity::affinity_propagation;
use super::MapNode;
use crate::nlp::split_sentences;
use std::collections::{HashMap, HashSet};

/// Fill in `sentences` for every internal node of the level, bottom up.
/// Leaves carry their full text already and get no summary.
pub fn extract_summaries(
    nodes: &mut [MapNode],
    sentence_embeddings: &HashMap<String, Vec<f64>>,
    top_n: usize,
) {
    for node in nodes {
        if node.is_leaf() {
            continue;
        }
        extract_summaries(&mut node.children, sentence_embeddings, top_n);

        let mut texts = Vec::new();
        collect_leaf_texts(&node.children, &mut texts);
        node.sentences = summarize(&texts, sentence_embeddings, top_n);
    }
}

fn collect_leaf_texts(nodes: &[MapNode], out: &mut Vec<String>) {
    for node in nodes {
        if node.is_leaf() {
            if let Some(text) = &node.text {
                out.push(text.clone());
            }
        } else {
            collect_leaf_texts(&node.children, out);
        }
    }
}

/// Representative sentences for a body of texts.
///
/// Sentences are clustered by their embeddings; the exemplar of each of the
/// `top_n` largest clusters is kept, largest first. When fewer than two
/// sentences have embeddings there is nothing to cluster, so the leading
/// sentences stand in as-is.
pub fn summarize(
    texts: &[String],
    sentence_embeddings: &HashMap<String, Vec<f64>>,
    top_n: usize,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let sentences: Vec<String> = texts
        .iter()
        .flat_map(|t| split_sentences(t))
        .filter(|s| seen.insert(s.clone()))
        .collect();

    let embedded: Vec<(&String, &Vec<f64>)> = sentences
        .iter()
        .filter_map(|s| sentence_embeddings.get(s).map(|e| (s, e)))
        .collect();
    if embedded.len() < 2 {
        return sentences.into_iter().take(top_n).collect();
    }

    let vectors: Vec<Vec<f64>> = embedded.iter().map(|(_, e)| (*e).clone()).collect();
    let clustering = affinity_propagation(&vectors);

    let mut sizes = vec![0_usize; clustering.cluster_count()];
    for &label in &clustering.labels {
        sizes[label] += 1;
    }
    let mut labels_by_size: Vec<usize> = (0..sizes.len()).collect();
    // Largest cluster first; label order breaks ties deterministically
    labels_by_size.sort_by_key(|&l| (std::cmp::Reverse(sizes[l]), l));

    labels_by_size
        .into_iter()
        .take(top_n)
        .map(|label| embedded[clustering.exemplars[label]].0.clone())
        .collect()
}
