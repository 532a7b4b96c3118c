//! Worker loop
//!
//! Per-message state machine: Received -> Executing -> {Succeeded, NotReady,
//! Failed}. One message is processed fully before the next is pulled; the
//! message is acknowledged only after the ledger has been updated, so a
//! crash in between causes at most a redelivery (task behaviors tolerate
//! re-execution).
//!
//! Failure policy: a failed execution is retried with the fixed delay until
//! the delivery's attempt count reaches `max_attempts`, then the message is
//! parked in `dead_letters`. Parameter validation failures and other
//! deterministic failures skip the retries and dead-letter immediately.
//! The chain never advances on failure.

use crate::error::{TaskError, TaskOutcome};
use crate::queue::{Delivery, QueueDispatcher};
use crate::runtime::{TaskBehavior, TaskHandle};
use crate::WorkerContext;
use chrono::Utc;
use textmap_common::{Error, Result};
use tracing::{debug, error, info, warn};

pub struct Worker {
    ctx: WorkerContext,
}

impl Worker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    /// Pull and process messages forever
    pub async fn run(&self) -> Result<()> {
        info!("worker loop started");
        loop {
            if !self.tick().await? {
                tokio::time::sleep(std::time::Duration::from_millis(
                    self.ctx.config.poll_interval_ms,
                ))
                .await;
            }
        }
    }

    /// Process at most one message; returns whether one was handled
    pub async fn tick(&self) -> Result<bool> {
        let Some(delivery) = self.ctx.queue.receive().await? else {
            return Ok(false);
        };
        self.process(delivery).await?;
        Ok(true)
    }

    async fn process(&self, delivery: Delivery) -> Result<()> {
        let msg = &delivery.message;
        debug!(
            type_tag = %msg.type_tag,
            job_id = %msg.job_id,
            task_id = %msg.task_id,
            attempt = delivery.attempts,
            "task message received"
        );

        // An unresolvable type tag is a configuration error, not a retryable
        // one: park it immediately so it is visible to operators.
        let behavior = match self.ctx.registry.resolve(&msg.type_tag) {
            Ok(behavior) => behavior,
            Err(e) => {
                error!(type_tag = %msg.type_tag, task_id = %msg.task_id, "unknown task type");
                self.dead_letter(&delivery, &e.to_string()).await?;
                self.ctx.queue.ack(&delivery).await?;
                return Ok(());
            }
        };

        let task = match TaskHandle::load(
            &self.ctx.ledger,
            &self.ctx.registry,
            &msg.task_id,
            Some(&msg.type_tag),
        )
        .await
        {
            Ok(task) => task,
            Err(e @ (Error::NotFound(_) | Error::TaskTypeMismatch { .. })) => {
                // Ledger drift is a data integrity violation; never guessed
                // around, never retried.
                error!(task_id = %msg.task_id, error = %e, "task failed to load");
                self.dead_letter(&delivery, &e.to_string()).await?;
                self.ctx.queue.ack(&delivery).await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        task.record_start_time().await?;
        match behavior.execute(&self.ctx, &task).await {
            Ok(TaskOutcome::Done) => {
                task.record_finish_time().await?;
                task.submit_next(self.ctx.queue.as_ref()).await?;
                debug!(task_id = %task.id(), "task succeeded");
            }
            Ok(TaskOutcome::Halted) => {
                // Cooperative stop: finish cleanly, never submit the next
                // task, the rest of the chain simply never runs.
                task.record_finish_time().await?;
                info!(task_id = %task.id(), job_id = %task.job_id(), "task halted by stop signal");
            }
            Err(TaskError::NotReady) => {
                // Expected control flow, not an error: the retry is a new
                // message with the fixed polling delay.
                debug!(task_id = %task.id(), "dependency not ready, resubmitting with delay");
                task.retry_with_delay(self.ctx.queue.as_ref(), self.ctx.config.retry_delay_ms)
                    .await?;
            }
            Err(TaskError::InvalidParameters(reason)) => {
                error!(
                    task_id = %task.id(),
                    job_id = %task.job_id(),
                    params = %task.params(),
                    reason = %reason,
                    "task parameters invalid"
                );
                task.append_event(
                    "task_failed",
                    "Task parameters failed validation.",
                    serde_json::json!({"reason": reason}),
                )
                .await?;
                self.dead_letter(&delivery, &reason).await?;
            }
            Err(TaskError::Unrecoverable(e)) => {
                // Deterministic failure: re-running cannot change the
                // outcome, so the retry budget is skipped entirely
                error!(
                    task_id = %task.id(),
                    job_id = %task.job_id(),
                    type_tag = %task.type_tag(),
                    error = %e,
                    "task failed unrecoverably, dead-lettering"
                );
                task.append_event(
                    "task_failed",
                    "Task failed with an unrecoverable error.",
                    serde_json::json!({"error": e.to_string()}),
                )
                .await?;
                self.dead_letter(&delivery, &e.to_string()).await?;
            }
            Err(TaskError::Fatal(e)) => {
                if delivery.attempts < self.ctx.config.max_attempts {
                    warn!(
                        task_id = %task.id(),
                        attempt = delivery.attempts,
                        max_attempts = self.ctx.config.max_attempts,
                        error = %e,
                        "task failed, will retry"
                    );
                    // Release, not republish: the message keeps its attempt
                    // count, so the retry budget actually runs out
                    self.ctx
                        .queue
                        .release(&delivery, self.ctx.config.retry_delay_ms)
                        .await?;
                    return Ok(());
                } else {
                    error!(
                        task_id = %task.id(),
                        job_id = %task.job_id(),
                        type_tag = %task.type_tag(),
                        params = %task.params(),
                        attempts = delivery.attempts,
                        error = %e,
                        "task failed permanently, dead-lettering"
                    );
                    task.append_event(
                        "task_failed",
                        "Task failed after exhausting retries.",
                        serde_json::json!({"error": e.to_string(), "attempts": delivery.attempts}),
                    )
                    .await?;
                    self.dead_letter(&delivery, &e.to_string()).await?;
                }
            }
        }

        self.ctx.queue.ack(&delivery).await?;
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> Result<()> {
        let msg = &delivery.message;
        sqlx::query(
            r#"
            INSERT INTO dead_letters (type_tag, job_id, task_id, params, attempts, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&msg.type_tag)
        .bind(&msg.job_id)
        .bind(&msg.task_id)
        .bind(msg.params.to_string())
        .bind(delivery.attempts as i64)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.ctx.db)
        .await?;
        Ok(())
    }
}
