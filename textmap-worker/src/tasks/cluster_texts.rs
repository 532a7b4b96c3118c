//! Cluster task
//!
//! Runs the full clustering pipeline over the job's embedded raw texts and
//! stages the finished tree for upload. Progress is recorded per stage so
//! the auditor shows where a long run currently is. The pipeline itself is
//! deterministic for a given input set, so a redelivered message simply
//! stages an identical tree again.

use crate::cluster::{geometry, keywords, serialize, summary, tree, tsne, BubbleTree, MapNode};
use crate::clusterings::ClusteringStore;
use crate::error::{TaskOutcome, TaskResult};
use crate::runtime::{TaskBehavior, TaskHandle};
use crate::WorkerContext;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use textmap_common::Error;
use tracing::{info, warn};

const STAGES: i64 = 7;

pub struct ClusterTexts;

#[async_trait]
impl TaskBehavior for ClusterTexts {
    fn description(&self) -> &'static str {
        "Cluster the job's texts into a hierarchical map."
    }

    async fn execute(&self, ctx: &WorkerContext, task: &TaskHandle) -> TaskResult {
        let job_id = task.job_id();

        let items = ctx.texts.load_embedded_raw(job_id).await?;
        let required = ctx.config.min_cluster_texts;
        if items.len() < required {
            warn!(job_id = %job_id, found = items.len(), required, "not enough texts to cluster");
            task.append_event(
                "insufficient_texts",
                "Too few embedded texts to build a map.",
                serde_json::json!({"found": items.len(), "required": required}),
            )
            .await?;
            return Err(Error::InsufficientData {
                found: items.len(),
                required,
            }
            .into());
        }
        task.record_progress(1, STAGES).await?;

        let embeddings: Vec<Vec<f64>> = items.iter().map(|t| t.embedding.clone()).collect();
        let coords = tsne::reduce(&embeddings, &ctx.config.tsne)?;
        task.record_progress(2, STAGES).await?;

        let leaves: Vec<MapNode> = items
            .iter()
            .zip(&coords)
            .map(|(item, &coord)| MapNode::leaf(item, coord))
            .collect();
        let mut level = tree::cluster_level(leaves);
        if let Some(max_breadth) = ctx.config.max_cluster_breadth {
            level = tree::break_down_wide_levels(level, max_breadth);
        }
        task.record_progress(3, STAGES).await?;

        tree::assign_children_counts(&mut level);
        geometry::assign_centroids(&mut level);
        let factor = geometry::radius_multiplier(&level);
        geometry::assign_radii(&mut level, factor);
        geometry::assign_parent_refs(&mut level);
        let metadata = geometry::compute_metadata(&level);
        task.record_progress(4, STAGES).await?;

        keywords::aggregate_keywords(&mut level);
        let mut rng = StdRng::seed_from_u64(ctx.config.tsne.seed);
        keywords::assign_draw_positions(&mut level, &mut rng);
        task.record_progress(5, STAGES).await?;

        let sentence_embeddings = ctx.texts.sentence_embeddings(job_id).await?;
        summary::extract_summaries(&mut level, &sentence_embeddings, ctx.config.summary_top_n);
        task.record_progress(6, STAGES).await?;

        let finished = BubbleTree {
            children: level,
            metadata,
        };
        let artifact = serialize::reshape(&finished);
        let json = serde_json::to_value(&artifact).map_err(Error::from)?;
        ClusteringStore::new(ctx.db.clone()).save(job_id, &json).await?;
        task.append_event(
            "clustering_saved",
            "Clustered tree staged for upload.",
            serde_json::json!({"texts": items.len(), "top_level": finished.children.len()}),
        )
        .await?;
        task.record_progress(STAGES, STAGES).await?;

        info!(
            job_id = %job_id,
            texts = items.len(),
            top_level = finished.children.len(),
            "clustering finished"
        );
        Ok(TaskOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::tasks::ingest::IngestTexts;
    use crate::tasks::{tests::test_context, CLUSTER_TEXTS, INGEST_TEXTS};
    use serde_json::json;

    async fn ingest(ctx: &crate::WorkerContext, texts: serde_json::Value) {
        let task = TaskHandle::create(
            &ctx.ledger,
            &ctx.registry,
            "job-1",
            INGEST_TEXTS,
            json!({ "texts": texts }),
        )
        .await
        .unwrap();
        IngestTexts.execute(ctx, &task).await.unwrap();
    }

    async fn cluster_task(ctx: &crate::WorkerContext) -> TaskHandle {
        TaskHandle::create(&ctx.ledger, &ctx.registry, "job-1", CLUSTER_TEXTS, json!({}))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn stages_a_tree_for_the_job() {
        let (_dir, ctx) = test_context().await;
        ingest(
            &ctx,
            json!([
                "The power cable snapped within a week.",
                "Cable quality is poor. Cable broke fast.",
                "Shipping was quick and the box was intact.",
                "Arrived two days early. Great shipping speed.",
                "Battery life is outstanding on this model.",
                "The battery lasts for days without charging."
            ]),
        )
        .await;

        let task = cluster_task(&ctx).await;
        let result = ClusterTexts.execute(&ctx, &task).await;
        assert!(matches!(result, Ok(TaskOutcome::Done)));

        let tree = ClusteringStore::new(ctx.db.clone())
            .load_latest("job-1")
            .await
            .unwrap()
            .expect("tree staged");
        let children = tree["children"].as_array().unwrap();
        assert!(!children.is_empty());
        assert!(tree["metadata"]["max_radius"].is_number());

        let record = ctx.ledger.load(task.id()).await.unwrap();
        assert_eq!(record.progress.done, STAGES);
        assert_eq!(record.progress.total, STAGES);
        let events = ctx.ledger.events_for_task(task.id()).await.unwrap();
        assert!(events.iter().any(|e| e.key == "clustering_saved"));
    }

    #[tokio::test]
    async fn every_leaf_of_the_tree_is_a_stored_text() {
        let (_dir, ctx) = test_context().await;
        ingest(
            &ctx,
            json!(["alpha text one", "beta text two", "gamma text three", "delta text four"]),
        )
        .await;
        let task = cluster_task(&ctx).await;
        ClusterTexts.execute(&ctx, &task).await.unwrap();

        let tree = ClusteringStore::new(ctx.db.clone())
            .load_latest("job-1")
            .await
            .unwrap()
            .unwrap();

        fn count_leaves(node: &serde_json::Value, leaves: &mut usize) {
            let children = node["children"].as_array().unwrap();
            if children.is_empty() {
                assert!(node["text"].is_string());
                assert!(node["text_id"].is_string());
                *leaves += 1;
            } else {
                for child in children {
                    count_leaves(child, leaves);
                }
            }
        }
        let mut leaves = 0;
        for child in tree["children"].as_array().unwrap() {
            count_leaves(child, &mut leaves);
        }
        // At least one leaf per raw text; exemplar self-copies may add more
        assert!(leaves >= 4);
    }

    #[tokio::test]
    async fn too_few_texts_fail_with_an_event() {
        let (_dir, ctx) = test_context().await;
        ingest(&ctx, json!(["only one text"])).await;

        let task = cluster_task(&ctx).await;
        let result = ClusterTexts.execute(&ctx, &task).await;
        // Deterministic shortfall, not a retryable failure
        assert!(matches!(result, Err(TaskError::Unrecoverable(_))));

        let events = ctx.ledger.events_for_task(task.id()).await.unwrap();
        assert!(events.iter().any(|e| e.key == "insufficient_texts"));
        // Nothing staged
        assert!(ClusteringStore::new(ctx.db.clone())
            .load_latest("job-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn re_execution_stages_again_without_failing() {
        let (_dir, ctx) = test_context().await;
        ingest(&ctx, json!(["one two", "three four", "five six"])).await;

        let task = cluster_task(&ctx).await;
        ClusterTexts.execute(&ctx, &task).await.unwrap();
        ClusterTexts.execute(&ctx, &task).await.unwrap();

        // Latest staged tree wins; duplicates are pruned after upload
        assert!(ClusteringStore::new(ctx.db.clone())
            .load_latest("job-1")
            .await
            .unwrap()
            .is_some());
    }
}
