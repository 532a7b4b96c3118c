//! Job auditor
//!
//! Reconstructs the ordered chain of a job's tasks for status reporting by
//! following the forward links. Pure read path; executes nothing, mutates
//! nothing. An ambiguous or cyclic chain is a data integrity violation and
//! is surfaced as an error, never silently resolved.

use crate::ledger::TaskStore;
use crate::runtime::TaskRegistry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use textmap_common::db::models::{Progress, TaskEvent, TaskRecord};
use textmap_common::{Error, Result};

/// One task of a job as presented by the status read model
#[derive(Debug, Clone, Serialize)]
pub struct AuditedTask {
    pub id: String,
    pub type_tag: String,
    /// Human-readable description of the task type, when registered
    pub description: Option<String>,
    pub progress: Progress,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub events: Vec<TaskEvent>,
}

pub struct JobAuditor<'a> {
    ledger: &'a TaskStore,
    registry: &'a TaskRegistry,
}

impl<'a> JobAuditor<'a> {
    pub fn new(ledger: &'a TaskStore, registry: &'a TaskRegistry) -> Self {
        Self { ledger, registry }
    }

    /// The job's tasks in chain order, head first
    pub async fn ordered_tasks(&self, job_id: &str) -> Result<Vec<AuditedTask>> {
        let tasks = self.ledger.tasks_for_job(job_id).await?;
        let ordered = order_chain(tasks)?;

        let mut audited = Vec::with_capacity(ordered.len());
        for task in ordered {
            let events = self.ledger.events_for_task(&task.id).await?;
            audited.push(AuditedTask {
                description: self
                    .registry
                    .description(&task.type_tag)
                    .map(|d| d.to_string()),
                id: task.id,
                type_tag: task.type_tag,
                progress: task.progress,
                started_at: task.started_at,
                finished_at: task.finished_at,
                events,
            });
        }
        Ok(audited)
    }
}

/// Order task rows by following `next_task_id` from the unique head.
///
/// The head is the one row whose id is not referenced as any other row's
/// `next_task_id`; zero heads means a cycle, more than one means a broken
/// chain, and both are integrity errors.
pub fn order_chain(tasks: Vec<TaskRecord>) -> Result<Vec<TaskRecord>> {
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let referenced: HashSet<&str> = tasks
        .iter()
        .filter_map(|t| t.next_task_id.as_deref())
        .collect();
    let mut heads = tasks.iter().filter(|t| !referenced.contains(t.id.as_str()));

    let head = match (heads.next(), heads.next()) {
        (Some(head), None) => head.id.clone(),
        (None, _) => return Err(Error::Chain("no head task; cyclic chain?".to_string())),
        (Some(_), Some(_)) => {
            return Err(Error::Chain("more than one head task".to_string()));
        }
    };

    let mut by_id: HashMap<String, TaskRecord> =
        tasks.into_iter().map(|t| (t.id.clone(), t)).collect();

    let mut ordered = Vec::with_capacity(by_id.len());
    let mut cursor = Some(head);
    while let Some(id) = cursor {
        let task = by_id
            .remove(&id)
            .ok_or_else(|| Error::Chain(format!("next_task_id points to missing task {}", id)))?;
        cursor = task.next_task_id.clone();
        ordered.push(task);
    }

    // Rows unreachable from the head (a disjoint cycle hiding behind a
    // valid chain) are an integrity violation too, not rows to drop
    if !by_id.is_empty() {
        return Err(Error::Chain(format!(
            "{} task(s) not reachable from the head",
            by_id.len()
        )));
    }
    Ok(ordered)
}
