//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One durable unit of work in a job's chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub job_id: String,
    pub type_tag: String,
    /// Arbitrary key/value payload, stored as JSON
    pub params: serde_json::Value,
    /// Forward link; tasks form a singly linked list per job
    pub next_task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: Progress,
}

/// done/total progress pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub done: i64,
    pub total: i64,
}

/// One entry in a task's append-only event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    /// Stable lookup key, e.g. `insufficient_texts`
    pub key: String,
    /// Human-readable description for the status API
    pub description: String,
    pub args: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One ranked token of a text, with its similarity to the whole text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenItem {
    pub token: String,
    pub similarity: f64,
}

/// Kind of a text item attached to a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum TextType {
    Raw = 1,
    Word = 2,
    Sentence = 3,
}
