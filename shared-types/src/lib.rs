//! Shared types between the agent API and its clients
//!
//! These types describe the JSON bodies of the HTTP surface:
//! - task submission and acknowledgement
//! - task status polling and listing
//! - liveness and health checks
//!
//! Serializable with serde; TypeScript bindings are generated with ts-rs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Acknowledgement status returned by task submission. Not a lifecycle state.
pub const TASK_STARTED_STATUS: &str = "started";

/// Preset selected when a submission omits `task`.
pub const DEFAULT_TASK_PRESET: &str = "default";

// ============================================================================
// Task Lifecycle
// ============================================================================

/// Lifecycle state of a task: `pending → running → {completed, failed}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../bindings/agent-api.ts")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage accumulated by the agent across its LLM calls
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/agent-api.ts")]
pub struct UsageSummary {
    #[ts(type = "number")]
    pub total_prompt_tokens: u64,
    #[ts(type = "number")]
    pub total_completion_tokens: u64,
    #[ts(type = "number")]
    pub total_tokens: u64,
    /// Number of LLM calls folded into this summary
    pub entry_count: u32,
}

impl UsageSummary {
    /// Fold one LLM call into the summary.
    pub fn record(&mut self, prompt_tokens: u64, completion_tokens: u64) {
        self.total_prompt_tokens += prompt_tokens;
        self.total_completion_tokens += completion_tokens;
        self.total_tokens += prompt_tokens + completion_tokens;
        self.entry_count += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }
}

/// Outcome stored on a completed task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../bindings/agent-api.ts")]
pub struct TaskResult {
    pub success: bool,
    pub usage: Option<UsageSummary>,
    /// Final message reported by the agent, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub final_result: Option<String>,
}

// ============================================================================
// Task Endpoints
// ============================================================================

fn default_task_preset() -> String {
    DEFAULT_TASK_PRESET.to_string()
}

/// Body of `POST /tasks`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/agent-api.ts")]
pub struct CreateTaskRequest {
    /// Preset selector; only `"default"` is defined
    #[serde(default = "default_task_preset")]
    pub task: String,
    /// Free-form instruction that replaces the preset when non-empty
    #[serde(default)]
    #[ts(optional)]
    pub custom_task: Option<String>,
}

impl Default for CreateTaskRequest {
    fn default() -> Self {
        Self {
            task: default_task_preset(),
            custom_task: None,
        }
    }
}

/// Response of `POST /tasks`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/agent-api.ts")]
pub struct CreateTaskResponse {
    pub task_id: String,
    /// Always `"started"`
    pub status: String,
    pub message: String,
}

/// Response of `GET /tasks/{task_id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../bindings/agent-api.ts")]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Response of `GET /tasks`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/agent-api.ts")]
pub struct TaskListResponse {
    pub tasks: Vec<String>,
    pub count: usize,
}

// ============================================================================
// Liveness and health
// ============================================================================

/// Response of `GET /`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/agent-api.ts")]
pub struct RootResponse {
    pub status: String,
    pub message: String,
}

/// Response of `GET /ping`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/agent-api.ts")]
pub struct PingResponse {
    pub ping: String,
}

/// Whether the shared browser session exists yet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../../bindings/agent-api.ts")]
pub enum BrowserStatus {
    Ready,
    Starting,
    NotStarted,
}

/// Response of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/agent-api.ts")]
pub struct HealthResponse {
    pub status: String,
    pub server: String,
    pub browser: BrowserStatus,
    pub tasks_count: usize,
    pub active_tasks: usize,
}

/// Error body for every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/agent-api.ts")]
pub struct ErrorResponse {
    pub detail: String,
}

// ============================================================================
// Tests
// ============================================================================
