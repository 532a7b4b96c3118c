//! Ingest task
//!
//! First task of every map job: persist the raw texts, split each into
//! sentences for the summary stage, attach everything to the job, and hand
//! the lot to the embedding service. Every step is idempotent (dedup by
//! body, attach-if-missing), so a redelivered message re-converges instead
//! of duplicating rows.

use crate::embeddings::EmbeddingSink;
use crate::error::{TaskError, TaskOutcome, TaskResult};
use crate::nlp::split_sentences;
use crate::runtime::{TaskBehavior, TaskHandle};
use crate::WorkerContext;
use async_trait::async_trait;
use serde::Deserialize;
use textmap_common::db::models::TextType;
use textmap_common::flags::total_texts_key;
use tracing::{debug, info};

/// Counter of embedding hand-offs for a job, kept for rate monitoring
pub fn embedding_requests_key(job_id: &str) -> String {
    format!("{}_EMBEDDING_REQUESTS", job_id)
}

#[derive(Debug, Deserialize)]
struct IngestParams {
    texts: Vec<String>,
}

pub struct IngestTexts;

#[async_trait]
impl TaskBehavior for IngestTexts {
    fn description(&self) -> &'static str {
        "Store raw texts and hand them to the embedding service."
    }

    async fn execute(&self, ctx: &WorkerContext, task: &TaskHandle) -> TaskResult {
        let params: IngestParams = task.typed_params()?;
        let bodies: Vec<&str> = params
            .texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if bodies.is_empty() {
            return Err(TaskError::InvalidParameters(
                "texts must contain at least one non-empty entry".to_string(),
            ));
        }

        let job_id = task.job_id();
        let total = bodies.len() as i64;
        task.record_progress(0, total).await?;

        for (i, body) in bodies.iter().enumerate() {
            let text_id = ctx.texts.upsert_by_body(body).await?;
            ctx.texts.attach_to_job(job_id, &text_id, TextType::Raw).await?;
            self.request(ctx, job_id, &text_id, body).await?;

            for sentence in split_sentences(body) {
                let sentence_id = ctx.texts.upsert_by_body(&sentence).await?;
                ctx.texts
                    .attach_to_job(job_id, &sentence_id, TextType::Sentence)
                    .await?;
                self.request(ctx, job_id, &sentence_id, &sentence).await?;
            }

            task.record_progress(i as i64 + 1, total).await?;
        }

        // The await task compares embedded rows against this figure, which
        // includes the derived sentences
        let attached = ctx.texts.total_count(job_id).await?;
        ctx.flags
            .set(&total_texts_key(job_id), &attached.to_string())
            .await?;

        task.append_event(
            "texts_ingested",
            "Texts stored and handed off for embedding.",
            serde_json::json!({"raw": bodies.len(), "attached": attached}),
        )
        .await?;
        info!(job_id = %job_id, raw = bodies.len(), attached, "texts ingested");
        Ok(TaskOutcome::Done)
    }
}

impl IngestTexts {
    async fn request(
        &self,
        ctx: &WorkerContext,
        job_id: &str,
        text_id: &str,
        body: &str,
    ) -> Result<(), TaskError> {
        ctx.embeddings.request_embedding(text_id, body).await?;
        let sent = ctx.flags.increment(&embedding_requests_key(job_id)).await?;
        debug!(job_id = %job_id, text_id, sent, "embedding requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::TaskHandle;
    use crate::tasks::{tests::test_context, INGEST_TEXTS};
    use serde_json::json;

    async fn run_ingest(texts: serde_json::Value) -> (tempfile::TempDir, crate::WorkerContext, TaskResult) {
        let (dir, ctx) = test_context().await;
        let task = TaskHandle::create(
            &ctx.ledger,
            &ctx.registry,
            "job-1",
            INGEST_TEXTS,
            json!({ "texts": texts }),
        )
        .await
        .unwrap();
        let result = IngestTexts.execute(&ctx, &task).await;
        (dir, ctx, result)
    }

    #[tokio::test]
    async fn stores_raw_texts_and_sentences() {
        let (_dir, ctx, result) =
            run_ingest(json!(["First thing. Second thing.", "Unrelated point"])).await;
        assert!(matches!(result, Ok(TaskOutcome::Done)));

        // 2 raw + 3 sentences ("First thing." "Second thing." "Unrelated point")
        assert_eq!(ctx.texts.total_count("job-1").await.unwrap(), 5);
        let total = ctx.flags.get(&total_texts_key("job-1")).await.unwrap();
        assert_eq!(total.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn blank_entries_are_dropped() {
        let (_dir, ctx, result) = run_ingest(json!(["  ", "Real text", ""])).await;
        assert!(matches!(result, Ok(TaskOutcome::Done)));
        // 1 raw + 1 sentence
        assert_eq!(ctx.texts.total_count("job-1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn all_blank_is_invalid() {
        let (_dir, _ctx, result) = run_ingest(json!(["", "   "])).await;
        assert!(matches!(result, Err(TaskError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn malformed_params_are_invalid() {
        let (_dir, ctx) = test_context().await;
        let task = TaskHandle::create(
            &ctx.ledger,
            &ctx.registry,
            "job-1",
            INGEST_TEXTS,
            json!({"texts": "not a list"}),
        )
        .await
        .unwrap();
        let result = IngestTexts.execute(&ctx, &task).await;
        assert!(matches!(result, Err(TaskError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn redelivery_does_not_duplicate() {
        let (_dir, ctx) = test_context().await;
        let task = TaskHandle::create(
            &ctx.ledger,
            &ctx.registry,
            "job-1",
            INGEST_TEXTS,
            json!({"texts": ["Same text every time."]}),
        )
        .await
        .unwrap();

        IngestTexts.execute(&ctx, &task).await.unwrap();
        let first = ctx.texts.total_count("job-1").await.unwrap();
        IngestTexts.execute(&ctx, &task).await.unwrap();
        assert_eq!(ctx.texts.total_count("job-1").await.unwrap(), first);
    }

    #[tokio::test]
    async fn embeddings_are_requested_for_every_row() {
        let (_dir, ctx, _) = run_ingest(json!(["One. Two."])).await;
        // Instant sink embeds synchronously: 1 raw + 2 sentences
        assert_eq!(ctx.texts.embedded_count("job-1").await.unwrap(), 3);
        let sent = ctx
            .flags
            .get(&embedding_requests_key("job-1"))
            .await
            .unwrap();
        assert_eq!(sent.as_deref(), Some("3"));
    }
}
