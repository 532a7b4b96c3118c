//! Queue dispatcher
//!
//! Thin publish/receive/acknowledge abstraction over the message broker.
//! The broker itself is an external collaborator; only this contract matters.
//! `SqliteQueue` is the bundled durable implementation: delayed delivery via
//! a `visible_at` timestamp and at-least-once semantics via a visibility
//! lease (an un-acked delivery becomes receivable again when its lease
//! expires, so task behaviors must tolerate redelivery).

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use textmap_common::Result;

/// Lease granted to a received message before it becomes visible again
const VISIBILITY_LEASE_MS: i64 = 30_000;

/// A task execution request on the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub type_tag: String,
    pub job_id: String,
    pub task_id: String,
    pub params: serde_json::Value,
    /// Delivery delay; 0 means immediately visible
    pub delay_ms: u64,
}

/// A received message plus its broker bookkeeping
#[derive(Debug, Clone)]
pub struct Delivery {
    pub receipt: i64,
    /// Delivery attempts so far, including this one
    pub attempts: u32,
    pub message: TaskMessage,
}

/// Publish/receive/acknowledge contract of the message broker
#[async_trait]
pub trait QueueDispatcher: Send + Sync {
    async fn publish(&self, message: TaskMessage) -> Result<()>;

    /// Pull at most one visible message; None when the queue is empty
    async fn receive(&self) -> Result<Option<Delivery>>;

    /// Acknowledge a delivery, removing the message permanently
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Give the delivery back to the queue, visible again after `delay_ms`.
    /// The message keeps its attempt count, unlike a fresh publish.
    async fn release(&self, delivery: &Delivery, delay_ms: u64) -> Result<()>;
}

/// SQLite-backed queue dispatcher
#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
}

impl SqliteQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of messages currently on the queue (visible or leased)
    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl QueueDispatcher for SqliteQueue {
    async fn publish(&self, message: TaskMessage) -> Result<()> {
        let visible_at = Utc::now().timestamp_millis() + message.delay_ms as i64;
        sqlx::query(
            r#"
            INSERT INTO queue_messages (type_tag, job_id, task_id, params, visible_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.type_tag)
        .bind(&message.job_id)
        .bind(&message.task_id)
        .bind(message.params.to_string())
        .bind(visible_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        let now = Utc::now().timestamp_millis();

        // Competing consumers race for the same row; the guarded UPDATE makes
        // sure only one of them wins the lease.
        loop {
            let Some(row) = sqlx::query(
                "SELECT id, type_tag, job_id, task_id, params, visible_at, attempts \
                 FROM queue_messages WHERE visible_at <= ? ORDER BY visible_at, id LIMIT 1",
            )
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            else {
                return Ok(None);
            };

            let id: i64 = row.get("id");
            let old_visible_at: i64 = row.get("visible_at");
            let claimed = sqlx::query(
                "UPDATE queue_messages SET visible_at = ?, attempts = attempts + 1 \
                 WHERE id = ? AND visible_at = ?",
            )
            .bind(now + VISIBILITY_LEASE_MS)
            .bind(id)
            .bind(old_visible_at)
            .execute(&self.pool)
            .await?;

            if claimed.rows_affected() == 0 {
                // Another consumer claimed it first; try the next row
                continue;
            }

            let params: String = row.get("params");
            let attempts: i64 = row.get("attempts");
            return Ok(Some(Delivery {
                receipt: id,
                attempts: attempts as u32 + 1,
                message: TaskMessage {
                    type_tag: row.get("type_tag"),
                    job_id: row.get("job_id"),
                    task_id: row.get("task_id"),
                    params: serde_json::from_str(&params)?,
                    delay_ms: 0,
                },
            }));
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        sqlx::query("DELETE FROM queue_messages WHERE id = ?")
            .bind(delivery.receipt)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release(&self, delivery: &Delivery, delay_ms: u64) -> Result<()> {
        sqlx::query("UPDATE queue_messages SET visible_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp_millis() + delay_ms as i64)
            .bind(delivery.receipt)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use textmap_common::db::init_database;

    async fn test_queue() -> (tempfile::TempDir, SqliteQueue) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("queue.db")).await.unwrap();
        (dir, SqliteQueue::new(pool))
    }

    fn message(tag: &str, delay_ms: u64) -> TaskMessage {
        TaskMessage {
            type_tag: tag.to_string(),
            job_id: "job-1".to_string(),
            task_id: "task-1".to_string(),
            params: json!({"n": 1}),
            delay_ms,
        }
    }

    #[tokio::test]
    async fn publish_receive_ack() {
        let (_dir, queue) = test_queue().await;
        queue.publish(message("dummy", 0)).await.unwrap();

        let delivery = queue.receive().await.unwrap().expect("message visible");
        assert_eq!(delivery.message.type_tag, "dummy");
        assert_eq!(delivery.attempts, 1);
        assert_eq!(delivery.message.params, json!({"n": 1}));

        // Leased: not receivable again until the lease expires
        assert!(queue.receive().await.unwrap().is_none());

        queue.ack(&delivery).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delayed_message_is_invisible_until_due() {
        let (_dir, queue) = test_queue().await;
        queue.publish(message("dummy", 60_000)).await.unwrap();
        assert!(queue.receive().await.unwrap().is_none());
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fifo_within_visible_messages() {
        let (_dir, queue) = test_queue().await;
        queue.publish(message("first", 0)).await.unwrap();
        queue.publish(message("second", 0)).await.unwrap();

        let a = queue.receive().await.unwrap().unwrap();
        let b = queue.receive().await.unwrap().unwrap();
        assert_eq!(a.message.type_tag, "first");
        assert_eq!(b.message.type_tag, "second");
    }

    #[tokio::test]
    async fn attempts_count_deliveries() {
        let (_dir, queue) = test_queue().await;
        queue.publish(message("dummy", 0)).await.unwrap();
        let first = queue.receive().await.unwrap().unwrap();
        assert_eq!(first.attempts, 1);
        queue.ack(&first).await.unwrap();

        queue.publish(message("dummy", 0)).await.unwrap();
        let second = queue.receive().await.unwrap().unwrap();
        assert_eq!(second.attempts, 1);
    }

    #[tokio::test]
    async fn release_preserves_attempts_across_redelivery() {
        let (_dir, queue) = test_queue().await;
        queue.publish(message("dummy", 0)).await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        queue.release(&first, 0).await.unwrap();

        let second = queue.receive().await.unwrap().unwrap();
        assert_eq!(second.receipt, first.receipt);
        assert_eq!(second.attempts, 2);

        // A fresh publish starts over at one
        queue.ack(&second).await.unwrap();
        queue.publish(message("dummy", 0)).await.unwrap();
        let fresh = queue.receive().await.unwrap().unwrap();
        assert_eq!(fresh.attempts, 1);
    }
}
