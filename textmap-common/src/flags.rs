//! Keyed flag store
//!
//! A narrow key/value capability backed by the `flags` table. Used for the
//! two cache-like concerns the system needs: the per-job stop signal and the
//! ingestion rate-limit counter. Passed explicitly to the components that
//! need it rather than living as ambient global state.

use crate::Result;
use sqlx::{Row, SqlitePool};

/// Key under which an out-of-band stop request is recorded for a job.
/// Write-only contract: the requester cannot observe whether the stop was
/// honored beyond the job's status no longer advancing.
pub fn stop_key(job_id: &str) -> String {
    format!("{}_STOP", job_id)
}

/// Key holding the total number of texts ingested for a job, written by the
/// ingest task and read by the await task.
pub fn total_texts_key(job_id: &str) -> String {
    format!("{}_TOTAL_TEXTS", job_id)
}

/// Keyed flag/counter store
#[derive(Clone)]
pub struct FlagStore {
    pool: SqlitePool,
}

impl FlagStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO flags (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM flags WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM flags WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically increment a counter flag, returning the new value.
    /// Used for the ingestion rate-limit counter.
    pub async fn increment(&self, key: &str) -> Result<i64> {
        sqlx::query(
            r#"
            INSERT INTO flags (key, value, updated_at) VALUES (?, '1', CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE
                SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT),
                    updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;
        let value: String = sqlx::query("SELECT value FROM flags WHERE key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await?
            .get("value");
        Ok(value.parse::<i64>().unwrap_or(0))
    }

    /// True when the flag holds a truthy marker ("1", "true", "yes")
    pub async fn is_set(&self, key: &str) -> Result<bool> {
        Ok(match self.get(key).await? {
            Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
            None => false,
        })
    }
}
