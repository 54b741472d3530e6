//! HTTP surface. Handlers are thin: they translate between JSON bodies and
//! [`TaskLifecycleManager`](crate::tasks::TaskLifecycleManager) calls.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use shared_types::{
    CreateTaskRequest, CreateTaskResponse, HealthResponse, PingResponse, RootResponse,
    TaskListResponse, TaskStatusResponse,
};

use crate::error::TaskError;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(root))
        .route("/ping", get(ping))
        .route("/health", get(health))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{task_id}", get(get_task))
}

/// GET /
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "online".to_string(),
        message: "Guruwalk Agent API".to_string(),
    })
}

/// GET /ping
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        ping: "pong".to_string(),
    })
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(state.tasks.health().await)
}

/// POST /tasks. Returns before the task runs.
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Json<CreateTaskResponse>, TaskError> {
    let response = state
        .tasks
        .submit(&request.task, request.custom_task.as_deref())
        .await?;
    Ok(Json(response))
}

/// GET /tasks/{task_id}
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, TaskError> {
    let record = state.tasks.status(&task_id).await?;
    Ok(Json(record.to_response()))
}

/// GET /tasks
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<TaskListResponse> {
    Json(state.tasks.list_all().await)
}
