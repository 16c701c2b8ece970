//! Wire types for task-augmented tool execution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// `_meta` key linking a `tasks/result` response to its task.
pub const RELATED_TASK_META_KEY: &str = "io.modelcontextprotocol/related-task";

/// `_meta` key hinting an interim model message on task creation.
pub const MODEL_IMMEDIATE_RESPONSE_META_KEY: &str =
    "io.modelcontextprotocol/model-immediate-response";

/// Task lifecycle status.
///
/// Terminal statuses (`Completed`, `Failed`, `Cancelled`) reject every
/// transition, including self-transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task is running.
    Working,
    /// The task is blocked on client input.
    InputRequired,
    /// The task finished successfully (terminal).
    Completed,
    /// The task failed (terminal).
    Failed,
    /// The task was cancelled (terminal).
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Working => write!(f, "working"),
            Self::InputRequired => write!(f, "input_required"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl TaskStatus {
    /// True for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// True if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        if self == next {
            return false;
        }
        match self {
            Self::Working | Self::InputRequired => true,
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

/// A task snapshot as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier.
    pub task_id: String,
    /// Current status.
    pub status: TaskStatus,
    /// Human-readable status detail (set on failure/cancellation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// RFC 3339 creation time, second precision.
    pub created_at: String,
    /// RFC 3339 last-update time, second precision.
    pub last_updated_at: String,
    /// Retention window in milliseconds after terminal status;
    /// serialized as `null` when unbounded.
    pub ttl: Option<u64>,
    /// Suggested polling interval in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,
}

/// The `task` field of a `tools/call` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParams {
    /// Requested retention window in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Requested polling interval in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,
}

/// Params of `tasks/get`, `tasks/result` and `tasks/cancel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskIdParams {
    /// The task in question.
    pub task_id: String,
}

/// Result of a task-augmented `tools/call`.
///
/// The task is wrapped in a `task` field; `tasks/get` and `tasks/cancel`
/// return the task fields flat instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskResult {
    /// The created task.
    pub task: Task,
    /// Result metadata (e.g. a model-immediate-response hint).
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

/// Result of `tasks/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksResult {
    /// One page of tasks, ordered by task id.
    pub tasks: Vec<Task>,
    /// Cursor for the next page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Builds the `_meta` entry tying a result to its originating task.
pub fn related_task_meta(task_id: &str) -> Map<String, Value> {
    let mut inner = Map::new();
    inner.insert("taskId".to_string(), Value::String(task_id.to_string()));

    let mut meta = Map::new();
    meta.insert(RELATED_TASK_META_KEY.to_string(), Value::Object(inner));
    meta
}
