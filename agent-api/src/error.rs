//! Error taxonomy for task handling and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use shared_types::{ErrorResponse, TaskStatus};

use crate::agent::AgentError;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Unknown task identifier
    #[error("task not found: {0}")]
    NotFound(String),
    /// Browser or LLM could not be provisioned
    #[error("{0}")]
    ResourceUnavailable(String),
    /// The automation agent failed
    #[error("{0}")]
    ExecutionFailure(String),
    /// The agent run exceeded the configured task timeout
    #[error("task timed out after {0}s")]
    Timeout(u64),
    /// A transition out of a terminal state, or out of order
    #[error("invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

impl TaskError {
    fn status_code(&self) -> StatusCode {
        match self {
            TaskError::NotFound(_) => StatusCode::NOT_FOUND,
            TaskError::ResourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            TaskError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            TaskError::ExecutionFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TaskError::InvalidTransition { .. } => StatusCode::CONFLICT,
        }
    }

    fn detail(&self) -> String {
        match self {
            TaskError::NotFound(_) => "Task not found".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<AgentError> for TaskError {
    fn from(err: AgentError) -> Self {
        TaskError::ExecutionFailure(err.to_string())
    }
}

impl IntoResponse for TaskError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            detail: self.detail(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
