//! textmap-worker library interface
//!
//! A worker process pulls one task message at a time from the queue,
//! resolves its type tag to executable behavior, runs it, and on success
//! submits the chained next task. Concurrency comes entirely from running
//! multiple worker processes against the same queue (competing consumers);
//! the queue and the ledger database are the only shared coordination
//! points.

pub mod auditor;
pub mod cluster;
pub mod clusterings;
pub mod embeddings;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod nlp;
pub mod queue;
pub mod runtime;
pub mod store;
pub mod tasks;
pub mod texts;
pub mod worker;

pub use error::{TaskError, TaskOutcome, TaskResult};

use crate::embeddings::EmbeddingSink;
use crate::ledger::TaskStore;
use crate::queue::QueueDispatcher;
use crate::runtime::TaskRegistry;
use crate::store::ObjectStore;
use crate::texts::TextStore;
use sqlx::SqlitePool;
use std::sync::Arc;
use textmap_common::config::WorkerConfig;
use textmap_common::flags::FlagStore;

/// Capabilities shared by all task executions in one worker process
#[derive(Clone)]
pub struct WorkerContext {
    pub db: SqlitePool,
    pub config: WorkerConfig,
    pub ledger: TaskStore,
    pub texts: TextStore,
    pub flags: FlagStore,
    pub queue: Arc<dyn QueueDispatcher>,
    pub objects: Arc<dyn ObjectStore>,
    pub embeddings: Arc<dyn EmbeddingSink>,
    pub registry: Arc<TaskRegistry>,
}

impl WorkerContext {
    pub fn new(
        db: SqlitePool,
        config: WorkerConfig,
        queue: Arc<dyn QueueDispatcher>,
        objects: Arc<dyn ObjectStore>,
        embeddings: Arc<dyn EmbeddingSink>,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            ledger: TaskStore::new(db.clone()),
            texts: TextStore::new(db.clone()),
            flags: FlagStore::new(db.clone()),
            db,
            config,
            queue,
            objects,
            embeddings,
            registry,
        }
    }
}
