//! Await-embedding task
//!
//! Polling barrier between ingestion and clustering. Each execution takes a
//! snapshot of how many of the job's texts the embedding service has
//! finished; while any are missing the task reports NotReady and the worker
//! resubmits it with the fixed delay. Also the job's stop checkpoint: a
//! raised stop flag halts the chain here, before the expensive stages.

use crate::error::{TaskError, TaskOutcome, TaskResult};
use crate::runtime::{TaskBehavior, TaskHandle};
use crate::WorkerContext;
use anyhow::anyhow;
use async_trait::async_trait;
use textmap_common::flags::{stop_key, total_texts_key};
use tracing::{debug, info};

pub struct AwaitEmbedding;

#[async_trait]
impl TaskBehavior for AwaitEmbedding {
    fn description(&self) -> &'static str {
        "Wait until every text of the job has an embedding."
    }

    async fn execute(&self, ctx: &WorkerContext, task: &TaskHandle) -> TaskResult {
        let job_id = task.job_id();

        if ctx.flags.is_set(&stop_key(job_id)).await? {
            task.append_event(
                "job_stopped",
                "Stop requested; the chain will not continue.",
                serde_json::json!({}),
            )
            .await?;
            info!(job_id = %job_id, "stop flag set, halting chain");
            return Ok(TaskOutcome::Halted);
        }

        // Written by the ingest task; its absence means the chain ran out
        // of order
        let total: i64 = match ctx.flags.get(&total_texts_key(job_id)).await? {
            Some(v) => v
                .parse()
                .map_err(|_| TaskError::Fatal(anyhow!("total texts flag is not a number: {v}")))?,
            None => {
                return Err(TaskError::Fatal(anyhow!(
                    "no total texts recorded for job {job_id}; was ingest skipped?"
                )))
            }
        };

        let embedded = ctx.texts.embedded_count(job_id).await?;
        task.record_progress(embedded, total).await?;
        if embedded < total {
            debug!(job_id = %job_id, embedded, total, "embeddings incomplete");
            return Err(TaskError::NotReady);
        }

        info!(job_id = %job_id, total, "all embeddings present");
        Ok(TaskOutcome::Done)
    }
}
