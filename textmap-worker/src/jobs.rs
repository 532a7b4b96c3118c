//! Job orchestration
//!
//! A map job is a fixed chain of four tasks: ingest the raw texts, wait for
//! the embedding service to catch up, cluster, upload the artifact. Only
//! the head is published; each task submits its successor on success, so
//! enqueueing is cheap no matter how large the corpus is.

use crate::runtime::TaskHandle;
use crate::tasks;
use crate::WorkerContext;
use serde_json::json;
use textmap_common::flags::stop_key;
use textmap_common::Result;
use tracing::info;
use uuid::Uuid;

/// Build and submit the task chain for a new map job.
/// Returns the job id under which status and the finished artifact are
/// addressed.
pub async fn enqueue_map_job(
    ctx: &WorkerContext,
    texts: Vec<String>,
    job_id: Option<String>,
) -> Result<String> {
    let job_id = job_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut ingest = TaskHandle::create(
        &ctx.ledger,
        &ctx.registry,
        &job_id,
        tasks::INGEST_TEXTS,
        json!({ "texts": texts }),
    )
    .await?;
    let mut await_embedding = TaskHandle::create(
        &ctx.ledger,
        &ctx.registry,
        &job_id,
        tasks::AWAIT_EMBEDDING,
        json!({}),
    )
    .await?;
    let mut cluster = TaskHandle::create(
        &ctx.ledger,
        &ctx.registry,
        &job_id,
        tasks::CLUSTER_TEXTS,
        json!({}),
    )
    .await?;
    let upload = TaskHandle::create(
        &ctx.ledger,
        &ctx.registry,
        &job_id,
        tasks::UPLOAD_MAP,
        json!({}),
    )
    .await?;

    ingest.chain(&await_embedding).await?;
    await_embedding.chain(&cluster).await?;
    cluster.chain(&upload).await?;

    ingest.submit(ctx.queue.as_ref()).await?;
    info!(job_id = %job_id, "map job enqueued");
    Ok(job_id)
}

/// Request that a running job stop at its next checkpoint. Fire-and-forget:
/// the requester observes the effect only through the job's status.
pub async fn request_stop(ctx: &WorkerContext, job_id: &str) -> Result<()> {
    ctx.flags.set(&stop_key(job_id), "true").await?;
    info!(job_id = %job_id, "stop requested");
    Ok(())
}
