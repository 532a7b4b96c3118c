//! Upload task
//!
//! Last task of the chain: compress the staged tree and put it in object
//! storage under the job's well-known key, then clean up the staging rows
//! and the job's flags. A key collision on redelivery means the artifact is
//! already up, which is success, not failure.

use crate::clusterings::ClusteringStore;
use crate::error::{TaskError, TaskOutcome, TaskResult};
use crate::runtime::{TaskBehavior, TaskHandle};
use crate::store::{map_key, ObjectStore};
use crate::tasks::ingest::embedding_requests_key;
use crate::WorkerContext;
use anyhow::anyhow;
use async_trait::async_trait;
use textmap_common::codec::encode_map;
use textmap_common::flags::{stop_key, total_texts_key};
use textmap_common::Error;
use tracing::{info, warn};

const STEPS: i64 = 3;

pub struct UploadMap;

#[async_trait]
impl TaskBehavior for UploadMap {
    fn description(&self) -> &'static str {
        "Compress the finished map and upload it to object storage."
    }

    async fn execute(&self, ctx: &WorkerContext, task: &TaskHandle) -> TaskResult {
        let job_id = task.job_id();
        let clusterings = ClusteringStore::new(ctx.db.clone());

        let Some(tree) = clusterings.load_latest(job_id).await? else {
            return Err(TaskError::Fatal(anyhow!(
                "no staged clustering for job {job_id}; did the cluster task run?"
            )));
        };
        task.record_progress(1, STEPS).await?;

        let encoded = encode_map(&tree)?;
        let key = map_key(job_id);
        match ctx.objects.put_new(&key, encoded.as_bytes()).await {
            Ok(()) => {
                task.append_event(
                    "map_uploaded",
                    "Compressed map stored.",
                    serde_json::json!({"key": key, "bytes": encoded.len()}),
                )
                .await?;
                info!(job_id = %job_id, key = %key, bytes = encoded.len(), "map uploaded");
            }
            Err(Error::AlreadyExists(_)) => {
                // Redelivered after a successful upload; the artifact is the
                // deterministic product of the same staged tree
                warn!(job_id = %job_id, key = %key, "artifact already uploaded, skipping");
            }
            Err(e) => return Err(e.into()),
        }
        task.record_progress(2, STEPS).await?;

        clusterings.prune_for_job(job_id).await?;
        ctx.flags.delete(&total_texts_key(job_id)).await?;
        ctx.flags.delete(&embedding_requests_key(job_id)).await?;
        ctx.flags.delete(&stop_key(job_id)).await?;
        task.record_progress(STEPS, STEPS).await?;

        Ok(TaskOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{tests::test_context, UPLOAD_MAP};
    use serde_json::json;
    use textmap_common::codec::decode_map;

    async fn upload_task(ctx: &crate::WorkerContext) -> TaskHandle {
        TaskHandle::create(&ctx.ledger, &ctx.registry, "job-1", UPLOAD_MAP, json!({}))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn uploads_the_staged_tree_and_cleans_up() {
        let (_dir, ctx) = test_context().await;
        let clusterings = ClusteringStore::new(ctx.db.clone());
        let tree = json!({"children": [], "metadata": {"x": {"min": 0.0, "max": 0.0}, "y": {"min": 0.0, "max": 0.0}, "max_radius": 0.0}});
        clusterings.save("job-1", &tree).await.unwrap();
        ctx.flags.set(&total_texts_key("job-1"), "3").await.unwrap();

        let task = upload_task(&ctx).await;
        let result = UploadMap.execute(&ctx, &task).await;
        assert!(matches!(result, Ok(TaskOutcome::Done)));

        // Artifact decodes back to the staged tree
        let stored = ctx
            .objects
            .get("maps/job-1")
            .await
            .unwrap()
            .expect("artifact present");
        let text = String::from_utf8(stored).unwrap();
        let decoded: serde_json::Value = decode_map(&text).unwrap();
        assert_eq!(decoded, tree);

        // Staging rows and flags are gone
        assert!(clusterings.load_latest("job-1").await.unwrap().is_none());
        assert!(ctx.flags.get(&total_texts_key("job-1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_staged_tree_is_fatal() {
        let (_dir, ctx) = test_context().await;
        let task = upload_task(&ctx).await;
        let result = UploadMap.execute(&ctx, &task).await;
        assert!(matches!(result, Err(TaskError::Fatal(_))));
    }

    #[tokio::test]
    async fn redelivery_after_upload_succeeds() {
        let (_dir, ctx) = test_context().await;
        let clusterings = ClusteringStore::new(ctx.db.clone());
        clusterings.save("job-1", &json!({"v": 1})).await.unwrap();

        let task = upload_task(&ctx).await;
        UploadMap.execute(&ctx, &task).await.unwrap();

        // Stage again (as a redelivered cluster task would) and re-run
        clusterings.save("job-1", &json!({"v": 1})).await.unwrap();
        let result = UploadMap.execute(&ctx, &task).await;
        assert!(matches!(result, Ok(TaskOutcome::Done)));
        assert!(ctx.objects.exists("maps/job-1").await.unwrap());
    }
}
