//! Embedding hand-off contract
//!
//! The embedding model lives behind an external service; the ingest task
//! only hands texts over and the await task polls the text store until the
//! service has written every vector back.

use async_trait::async_trait;
use textmap_common::Result;
use tracing::debug;

/// Where ingested texts are sent for embedding
#[async_trait]
pub trait EmbeddingSink: Send + Sync {
    async fn request_embedding(&self, text_id: &str, body: &str) -> Result<()>;
}

/// Production wiring publishes to the embedding topic of the external
/// broker; this stand-in only logs, leaving texts unembedded until the
/// service processes them out of band.
pub struct LoggingEmbeddingSink;

#[async_trait]
impl EmbeddingSink for LoggingEmbeddingSink {
    async fn request_embedding(&self, text_id: &str, body: &str) -> Result<()> {
        let tip: String = body.chars().take(40).collect();
        debug!(text_id, tip = %tip, "text handed off for embedding");
        Ok(())
    }
}
