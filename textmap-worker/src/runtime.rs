//! Task runtime
//!
//! In-process wrapper around a ledger record. A `TaskHandle` is created
//! fresh (persisting a new row) or loaded by id, always validating that the
//! stored type tag resolves to executable behavior in the registry. All
//! chaining, submission, and retry goes through the handle.

use crate::error::{TaskError, TaskResult};
use crate::ledger::TaskStore;
use crate::queue::{QueueDispatcher, TaskMessage};
use crate::WorkerContext;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use textmap_common::db::models::TaskRecord;
use textmap_common::{Error, Result};

/// Executable behavior behind a task type tag
#[async_trait]
pub trait TaskBehavior: Send + Sync {
    /// Human-readable description shown by the job auditor
    fn description(&self) -> &'static str;

    async fn execute(&self, ctx: &WorkerContext, task: &TaskHandle) -> TaskResult;
}

/// Maps string type tags to executable behaviors.
///
/// Registration-time validation: a tag registered twice is a programming
/// error and panics immediately rather than silently shadowing behavior.
#[derive(Default)]
pub struct TaskRegistry {
    behaviors: HashMap<String, Arc<dyn TaskBehavior>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_tag: &str, behavior: Arc<dyn TaskBehavior>) {
        let previous = self.behaviors.insert(type_tag.to_string(), behavior);
        assert!(
            previous.is_none(),
            "task type '{}' registered twice",
            type_tag
        );
    }

    /// Resolve a tag to its behavior; an unresolvable tag is a configuration
    /// error, not a retryable condition
    pub fn resolve(&self, type_tag: &str) -> Result<Arc<dyn TaskBehavior>> {
        self.behaviors
            .get(type_tag)
            .cloned()
            .ok_or_else(|| Error::UnknownTaskType(type_tag.to_string()))
    }

    pub fn description(&self, type_tag: &str) -> Option<&'static str> {
        self.behaviors.get(type_tag).map(|b| b.description())
    }
}

/// Runtime wrapper binding a ledger record to its store
#[derive(Clone)]
pub struct TaskHandle {
    record: TaskRecord,
    store: TaskStore,
}

impl TaskHandle {
    /// Create a fresh task, persisting its ledger row.
    /// The type tag must resolve in the registry at creation time.
    pub async fn create(
        store: &TaskStore,
        registry: &TaskRegistry,
        job_id: &str,
        type_tag: &str,
        params: serde_json::Value,
    ) -> Result<Self> {
        registry.resolve(type_tag)?;
        let record = store.create(job_id, type_tag, &params).await?;
        Ok(Self {
            record,
            store: store.clone(),
        })
    }

    /// Load an existing task by id.
    ///
    /// Fails with `UnknownTaskType` if the stored tag no longer resolves
    /// (behavior drift between creation and execution), and with
    /// `TaskTypeMismatch` when `expected_tag` disagrees with the stored tag.
    pub async fn load(
        store: &TaskStore,
        registry: &TaskRegistry,
        id: &str,
        expected_tag: Option<&str>,
    ) -> Result<Self> {
        let record = store.load(id).await?;
        registry.resolve(&record.type_tag)?;
        if let Some(expected) = expected_tag {
            if expected != record.type_tag {
                return Err(Error::TaskTypeMismatch {
                    stored: record.type_tag,
                    requested: expected.to_string(),
                });
            }
        }
        Ok(Self {
            record,
            store: store.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn job_id(&self) -> &str {
        &self.record.job_id
    }

    pub fn type_tag(&self) -> &str {
        &self.record.type_tag
    }

    pub fn params(&self) -> &serde_json::Value {
        &self.record.params
    }

    /// Deserialize the parameter payload into the task's typed schema,
    /// failing fast before any side effect
    pub fn typed_params<T: serde::de::DeserializeOwned>(&self) -> std::result::Result<T, TaskError> {
        serde_json::from_value(self.record.params.clone())
            .map_err(|e| TaskError::InvalidParameters(e.to_string()))
    }

    /// Link `next` as this task's successor and persist the link
    pub async fn chain(&mut self, next: &TaskHandle) -> Result<()> {
        self.store.set_next(&self.record.id, next.id()).await?;
        self.record.next_task_id = Some(next.id().to_string());
        Ok(())
    }

    fn message(&self, delay_ms: u64) -> TaskMessage {
        TaskMessage {
            type_tag: self.record.type_tag.clone(),
            job_id: self.record.job_id.clone(),
            task_id: self.record.id.clone(),
            params: self.record.params.clone(),
            delay_ms,
        }
    }

    /// Publish this task for execution
    pub async fn submit(&self, queue: &dyn QueueDispatcher) -> Result<()> {
        queue.publish(self.message(0)).await
    }

    /// Resubmit this task with a fixed delay (polling backoff, not
    /// exponential)
    pub async fn retry_with_delay(&self, queue: &dyn QueueDispatcher, delay_ms: u64) -> Result<()> {
        queue.publish(self.message(delay_ms)).await
    }

    /// Submit the chained next task, if any. Re-reads the ledger so a link
    /// added after this handle was loaded is still honored.
    pub async fn submit_next(&self, queue: &dyn QueueDispatcher) -> Result<()> {
        let record = self.store.load(&self.record.id).await?;
        if let Some(next_id) = record.next_task_id {
            let next = self.store.load(&next_id).await?;
            queue
                .publish(TaskMessage {
                    type_tag: next.type_tag,
                    job_id: next.job_id,
                    task_id: next.id,
                    params: next.params,
                    delay_ms: 0,
                })
                .await?;
        }
        Ok(())
    }

    pub async fn record_start_time(&self) -> Result<()> {
        self.store.record_start_time(&self.record.id).await
    }

    pub async fn record_finish_time(&self) -> Result<()> {
        self.store.record_finish_time(&self.record.id).await
    }

    pub async fn record_progress(&self, done: i64, total: i64) -> Result<()> {
        self.store.record_progress(&self.record.id, done, total).await
    }

    pub async fn append_event(
        &self,
        key: &str,
        description: &str,
        args: serde_json::Value,
    ) -> Result<()> {
        self.store
            .append_event(&self.record.id, key, description, &args)
            .await
    }
}
