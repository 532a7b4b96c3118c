//! Durable task ledger
//!
//! The `tasks` table is the single source of truth for task state: every
//! mutation here writes through synchronously so external status readers
//! always see committed state. No in-memory copy of a task is authoritative
//! beyond the lifetime of a single execution call.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use textmap_common::db::models::{Progress, TaskEvent, TaskRecord};
use textmap_common::{Error, Result};
use uuid::Uuid;

/// Persistence operations for the task ledger
#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and persist a new task, assigning its id
    pub async fn create(
        &self,
        job_id: &str,
        type_tag: &str,
        params: &serde_json::Value,
    ) -> Result<TaskRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO tasks (id, job_id, type_tag, params, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(job_id)
        .bind(type_tag)
        .bind(params.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(TaskRecord {
            id,
            job_id: job_id.to_string(),
            type_tag: type_tag.to_string(),
            params: params.clone(),
            next_task_id: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            progress: Progress::default(),
        })
    }

    /// Load a task by id
    pub async fn load(&self, id: &str) -> Result<TaskRecord> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {}", id)))?;
        row_to_record(&row)
    }

    /// All tasks belonging to a job, in no particular order
    pub async fn tasks_for_job(&self, job_id: &str) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE job_id = ?")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    /// Set the forward link of a task
    pub async fn set_next(&self, id: &str, next_task_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE tasks SET next_task_id = ? WHERE id = ?")
            .bind(next_task_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("task {}", id)));
        }
        Ok(())
    }

    pub async fn record_start_time(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE tasks SET started_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_finish_time(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE tasks SET finished_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_progress(&self, id: &str, done: i64, total: i64) -> Result<()> {
        sqlx::query("UPDATE tasks SET progress_done = ?, progress_total = ? WHERE id = ?")
            .bind(done)
            .bind(total)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Append a structured record to the task's event log
    pub async fn append_event(
        &self,
        task_id: &str,
        key: &str,
        description: &str,
        args: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO task_events (task_id, key, description, args, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(task_id)
        .bind(key)
        .bind(description)
        .bind(args.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Ordered event log of a task
    pub async fn events_for_task(&self, task_id: &str) -> Result<Vec<TaskEvent>> {
        let rows = sqlx::query(
            "SELECT task_id, key, description, args, created_at FROM task_events \
             WHERE task_id = ? ORDER BY id ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let args: String = row.get("args");
                Ok(TaskEvent {
                    task_id: row.get("task_id"),
                    key: row.get("key"),
                    description: row.get("description"),
                    args: serde_json::from_str(&args)?,
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    /// Cleanup tooling only; tasks are otherwise never deleted
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM task_events WHERE task_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<TaskRecord> {
    let params: String = row.get("params");
    Ok(TaskRecord {
        id: row.get("id"),
        job_id: row.get("job_id"),
        type_tag: row.get("type_tag"),
        params: serde_json::from_str(&params)?,
        next_task_id: row.get("next_task_id"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        progress: Progress {
            done: row.get("progress_done"),
            total: row.get("progress_total"),
        },
    })
}
