//! Text store
//!
//! Owns the `texts` and `job_texts` tables. Texts are keyed by an opaque id
//! and deduplicated by body so an already-embedded text is reused across
//! jobs. The embedding service (an external collaborator) mutates the
//! `embedding` and `tokens` columns; the clustering pipeline only reads.

use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use textmap_common::db::models::{TextType, TokenItem};
use textmap_common::Result;
use uuid::Uuid;

/// A text with its embedding, as consumed by the clustering pipeline
#[derive(Debug, Clone)]
pub struct EmbeddedText {
    pub id: String,
    pub body: String,
    pub embedding: Vec<f64>,
    pub tokens: Vec<TokenItem>,
}

#[derive(Clone)]
pub struct TextStore {
    pool: SqlitePool,
}

impl TextStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a text, reusing an existing row with the same body.
    /// Returns the text id either way, so re-execution is idempotent.
    pub async fn upsert_by_body(&self, body: &str) -> Result<String> {
        if let Some(row) = sqlx::query("SELECT id FROM texts WHERE body = ?")
            .bind(body)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(row.get("id"));
        }
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO texts (id, body) VALUES (?, ?)")
            .bind(&id)
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    /// Attach a text to a job unless the mapping already exists
    pub async fn attach_to_job(&self, job_id: &str, text_id: &str, text_type: TextType) -> Result<()> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_texts WHERE job_id = ? AND text_id = ? AND text_type = ?",
        )
        .bind(job_id)
        .bind(text_id)
        .bind(text_type as i64)
        .fetch_one(&self.pool)
        .await?;
        if exists > 0 {
            return Ok(());
        }
        sqlx::query("INSERT INTO job_texts (job_id, text_id, text_type) VALUES (?, ?, ?)")
            .bind(job_id)
            .bind(text_id)
            .bind(text_type as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_embedding(&self, text_id: &str, embedding: &[f64]) -> Result<()> {
        sqlx::query("UPDATE texts SET embedding = ? WHERE id = ?")
            .bind(serde_json::to_string(embedding)?)
            .bind(text_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_tokens(&self, text_id: &str, tokens: &[TokenItem]) -> Result<()> {
        sqlx::query("UPDATE texts SET tokens = ? WHERE id = ?")
            .bind(serde_json::to_string(tokens)?)
            .bind(text_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// How many of this job's texts have an embedding, without scanning the
    /// whole text store
    pub async fn embedded_count(&self, job_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_texts jt JOIN texts t ON t.id = jt.text_id \
             WHERE jt.job_id = ? AND t.embedding IS NOT NULL",
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn total_count(&self, job_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM job_texts WHERE job_id = ?")
                .bind(job_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// All embedded raw texts mapped to a job; input to the clustering
    /// pipeline
    pub async fn load_embedded_raw(&self, job_id: &str) -> Result<Vec<EmbeddedText>> {
        let rows = sqlx::query(
            "SELECT t.id, t.body, t.embedding, t.tokens \
             FROM job_texts jt JOIN texts t ON t.id = jt.text_id \
             WHERE jt.job_id = ? AND jt.text_type = ? AND t.embedding IS NOT NULL \
             ORDER BY jt.id ASC",
        )
        .bind(job_id)
        .bind(TextType::Raw as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let embedding: String = row.get("embedding");
                let tokens: Option<String> = row.get("tokens");
                Ok(EmbeddedText {
                    id: row.get("id"),
                    body: row.get("body"),
                    embedding: serde_json::from_str(&embedding)?,
                    tokens: match tokens {
                        Some(t) => serde_json::from_str(&t)?,
                        None => Vec::new(),
                    },
                })
            })
            .collect()
    }

    /// Body -> embedding lookup for the job's sentence texts; feeds the
    /// summary extraction stage
    pub async fn sentence_embeddings(&self, job_id: &str) -> Result<HashMap<String, Vec<f64>>> {
        let rows = sqlx::query(
            "SELECT t.body, t.embedding \
             FROM job_texts jt JOIN texts t ON t.id = jt.text_id \
             WHERE jt.job_id = ? AND jt.text_type = ? AND t.embedding IS NOT NULL",
        )
        .bind(job_id)
        .bind(TextType::Sentence as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut map = HashMap::new();
        for row in &rows {
            let body: String = row.get("body");
            let embedding: String = row.get("embedding");
            map.insert(body, serde_json::from_str(&embedding)?);
        }
        Ok(map)
    }

    /// Text ids of a job that still lack an embedding
    pub async fn unembedded_ids(&self, job_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT t.id FROM job_texts jt JOIN texts t ON t.id = jt.text_id \
             WHERE jt.job_id = ? AND t.embedding IS NULL",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textmap_common::db::init_database;

    async fn test_store() -> (tempfile::TempDir, TextStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("texts.db")).await.unwrap();
        (dir, TextStore::new(pool))
    }

    #[tokio::test]
    async fn upsert_deduplicates_by_body() {
        let (_dir, store) = test_store().await;
        let a = store.upsert_by_body("hello world").await.unwrap();
        let b = store.upsert_by_body("hello world").await.unwrap();
        let c = store.upsert_by_body("different").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn attach_is_idempotent() {
        let (_dir, store) = test_store().await;
        let id = store.upsert_by_body("hi").await.unwrap();
        store.attach_to_job("job-1", &id, TextType::Raw).await.unwrap();
        store.attach_to_job("job-1", &id, TextType::Raw).await.unwrap();
        assert_eq!(store.total_count("job-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn counts_track_embedding_progress() {
        let (_dir, store) = test_store().await;
        let a = store.upsert_by_body("first").await.unwrap();
        let b = store.upsert_by_body("second").await.unwrap();
        store.attach_to_job("job-1", &a, TextType::Raw).await.unwrap();
        store.attach_to_job("job-1", &b, TextType::Raw).await.unwrap();

        assert_eq!(store.total_count("job-1").await.unwrap(), 2);
        assert_eq!(store.embedded_count("job-1").await.unwrap(), 0);
        assert_eq!(store.unembedded_ids("job-1").await.unwrap().len(), 2);

        store.set_embedding(&a, &[0.1, 0.2]).await.unwrap();
        assert_eq!(store.embedded_count("job-1").await.unwrap(), 1);

        store.set_embedding(&b, &[0.3, 0.4]).await.unwrap();
        assert_eq!(store.embedded_count("job-1").await.unwrap(), 2);
        assert!(store.unembedded_ids("job-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_embedded_raw_skips_sentences_and_unembedded() {
        let (_dir, store) = test_store().await;
        let raw = store.upsert_by_body("a raw comment").await.unwrap();
        let sentence = store.upsert_by_body("a sentence").await.unwrap();
        let pending = store.upsert_by_body("not embedded yet").await.unwrap();
        store.attach_to_job("job-1", &raw, TextType::Raw).await.unwrap();
        store
            .attach_to_job("job-1", &sentence, TextType::Sentence)
            .await
            .unwrap();
        store.attach_to_job("job-1", &pending, TextType::Raw).await.unwrap();

        store.set_embedding(&raw, &[1.0, 2.0, 3.0]).await.unwrap();
        store.set_embedding(&sentence, &[4.0, 5.0, 6.0]).await.unwrap();
        store
            .set_tokens(
                &raw,
                &[TokenItem {
                    token: "comment".to_string(),
                    similarity: 0.9,
                }],
            )
            .await
            .unwrap();

        let loaded = store.load_embedded_raw("job-1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].body, "a raw comment");
        assert_eq!(loaded[0].embedding, vec![1.0, 2.0, 3.0]);
        assert_eq!(loaded[0].tokens[0].token, "comment");

        let sentences = store.sentence_embeddings("job-1").await.unwrap();
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences["a sentence"], vec![4.0, 5.0, 6.0]);
    }
}
