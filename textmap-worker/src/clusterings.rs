//! Clustering persistence
//!
//! Finished trees are staged in the `clusterings` table between the cluster
//! and upload tasks, so the expensive pipeline never re-runs just because
//! the upload was redelivered. Rows are pruned once the artifact is safely
//! in object storage.

use sqlx::{Row, SqlitePool};
use textmap_common::Result;

#[derive(Clone)]
pub struct ClusteringStore {
    pool: SqlitePool,
}

impl ClusteringStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, job_id: &str, tree: &serde_json::Value) -> Result<()> {
        sqlx::query("INSERT INTO clusterings (job_id, tree) VALUES (?, ?)")
            .bind(job_id)
            .bind(tree.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Most recently saved tree for the job, if any
    pub async fn load_latest(&self, job_id: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query(
            "SELECT tree FROM clusterings WHERE job_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let tree: String = row.get("tree");
                Ok(Some(serde_json::from_str(&tree)?))
            }
            None => Ok(None),
        }
    }

    /// Drop every staged tree of the job after upload
    pub async fn prune_for_job(&self, job_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM clusterings WHERE job_id = ?")
            .bind(job_id)
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

    async fn test_store() -> (tempfile::TempDir, ClusteringStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("clusterings.db")).await.unwrap();
        (dir, ClusteringStore::new(pool))
    }

    #[tokio::test]
    async fn latest_wins_and_prune_clears() {
        let (_dir, store) = test_store().await;
        assert!(store.load_latest("job-1").await.unwrap().is_none());

        store.save("job-1", &json!({"v": 1})).await.unwrap();
        store.save("job-1", &json!({"v": 2})).await.unwrap();
        store.save("job-2", &json!({"v": 9})).await.unwrap();

        assert_eq!(store.load_latest("job-1").await.unwrap(), Some(json!({"v": 2})));

        store.prune_for_job("job-1").await.unwrap();
        assert!(store.load_latest("job-1").await.unwrap().is_none());
        // Other jobs untouched
        assert_eq!(store.load_latest("job-2").await.unwrap(), Some(json!({"v": 9})));
    }
}
