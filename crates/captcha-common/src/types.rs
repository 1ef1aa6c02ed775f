//! Core types shared between the HTTP server and the task worker.

use serde::{Deserialize, Serialize};

/// A stored CAPTCHA challenge.
///
/// Only a hash of the answer is persisted; the plain answer lives in the
/// rendered image and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaRecord {
    /// Random URL-safe identifier
    pub id: String,

    /// SHA-256 of the normalized answer (base64)
    pub answer_hash: String,

    /// Unix epoch seconds
    pub created_at: i64,
}

impl CaptchaRecord {
    /// Unix timestamp after which the challenge can no longer be answered
    pub fn expires_at(&self, validity_secs: u64) -> i64 {
        self.created_at + validity_secs as i64
    }

    /// Check whether the challenge is past its validity window at `now`
    pub fn is_expired(&self, validity_secs: u64, now: i64) -> bool {
        now > self.expires_at(validity_secs)
    }
}

/// A unit of work placed on the broker queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    /// Unique task id (also the result backend key suffix)
    pub id: String,

    /// Registered task name
    pub task: String,

    /// Task arguments, `null` when the task takes none
    #[serde(default)]
    pub args: serde_json::Value,

    /// Unix timestamp when the message was enqueued
    pub enqueued_at: i64,
}

impl TaskMessage {
    pub fn new(id: String, task: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id,
            task: task.into(),
            args,
            enqueued_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Outcome of a task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failure,
}

/// What the worker writes to the result backend after running a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub task: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: i64,
}

impl TaskResult {
    pub fn success(message: &TaskMessage, result: serde_json::Value) -> Self {
        Self {
            task_id: message.id.clone(),
            task: message.task.clone(),
            status: TaskStatus::Success,
            result,
            error: None,
            finished_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn failure(message: &TaskMessage, error: impl Into<String>) -> Self {
        Self {
            task_id: message.id.clone(),
            task: message.task.clone(),
            status: TaskStatus::Failure,
            result: serde_json::Value::Null,
            error: Some(error.into()),
            finished_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}
