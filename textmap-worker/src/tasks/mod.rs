//! Built-in task behaviors
//!
//! The four tasks of a map job, in chain order. Type tags are the stable
//! wire names stored in the ledger and on queue messages; changing one
//! strands every in-flight task created under the old name.

pub mod await_embedding;
pub mod cluster_texts;
pub mod ingest;
pub mod upload_map;

use crate::runtime::TaskRegistry;
use std::sync::Arc;

pub const INGEST_TEXTS: &str = "ingest_texts";
pub const AWAIT_EMBEDDING: &str = "await_embedding";
pub const CLUSTER_TEXTS: &str = "cluster_texts";
pub const UPLOAD_MAP: &str = "upload_map";

/// Registry with every built-in task wired in
pub fn default_registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry.register(INGEST_TEXTS, Arc::new(ingest::IngestTexts));
    registry.register(AWAIT_EMBEDDING, Arc::new(await_embedding::AwaitEmbedding));
    registry.register(CLUSTER_TEXTS, Arc::new(cluster_texts::ClusterTexts));
    registry.register(UPLOAD_MAP, Arc::new(upload_map::UploadMap));
    registry
}
