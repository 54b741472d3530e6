use std::sync::Arc;
use std::time::Duration;

use shared_types::{
    CreateTaskResponse, HealthResponse, TaskListResponse, TaskStatus, DEFAULT_TASK_PRESET,
    TASK_STARTED_STATUS,
};
use tokio::sync::RwLock;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use super::executor::TaskExecutor;
use super::record::{TaskId, TaskRecord};
use super::store::TaskStore;
use crate::error::TaskError;
use crate::resources::ResourceProvisioner;

/// Entry point for the HTTP layer: creates tasks, dispatches their execution,
/// and answers queries.
///
/// Every accepted submission is spawned exactly once on the tracker. Spawned
/// work is detached from the request that created it.
pub struct TaskLifecycleManager {
    store: Arc<TaskStore>,
    executor: Arc<TaskExecutor>,
    resources: Arc<ResourceProvisioner>,
    tracker: TaskTracker,
    /// Read-held by `submit` across check, create and spawn. Write-held by
    /// `shutdown` while the tracker is closed.
    accepting: RwLock<bool>,
    default_task: String,
}

impl TaskLifecycleManager {
    pub fn new(
        store: Arc<TaskStore>,
        executor: Arc<TaskExecutor>,
        resources: Arc<ResourceProvisioner>,
        default_task: impl Into<String>,
    ) -> Self {
        Self {
            store,
            executor,
            resources,
            tracker: TaskTracker::new(),
            accepting: RwLock::new(true),
            default_task: default_task.into(),
        }
    }

    /// Instruction to run: a non-empty custom text wins, otherwise the preset.
    pub fn resolve_instruction(&self, preset: &str, custom_task: Option<&str>) -> String {
        if let Some(custom) = custom_task.filter(|text| !text.is_empty()) {
            return custom.to_string();
        }
        if preset != DEFAULT_TASK_PRESET {
            warn!(preset, "unknown task preset, using default");
        }
        self.default_task.clone()
    }

    pub async fn submit(
        &self,
        preset: &str,
        custom_task: Option<&str>,
    ) -> Result<CreateTaskResponse, TaskError> {
        let accepting = self.accepting.read().await;
        if !*accepting {
            return Err(TaskError::ResourceUnavailable(
                "Server is shutting down".to_string(),
            ));
        }

        let task_text = self.resolve_instruction(preset, custom_task);
        let id = self.store.create(task_text.clone()).await;
        info!(task_id = %id, custom = custom_task.is_some_and(|t| !t.is_empty()), "task created");

        let executor = self.executor.clone();
        self.tracker
            .spawn(async move { executor.execute(id, task_text).await });
        drop(accepting);

        Ok(CreateTaskResponse {
            task_id: id.to_string(),
            status: TASK_STARTED_STATUS.to_string(),
            message: "Task created successfully".to_string(),
        })
    }

    /// Look up a task by its textual id. Malformed ids are simply unknown.
    pub async fn status(&self, task_id: &str) -> Result<TaskRecord, TaskError> {
        let id: TaskId = task_id.parse()?;
        self.store.get(id).await
    }

    pub async fn list_all(&self) -> TaskListResponse {
        let tasks: Vec<String> = self
            .store
            .list()
            .await
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        TaskListResponse {
            count: tasks.len(),
            tasks,
        }
    }

    pub async fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy".to_string(),
            server: "online".to_string(),
            browser: self.resources.browser_status(),
            tasks_count: self.store.count().await,
            active_tasks: self.store.count_with_status(TaskStatus::Running).await,
        }
    }

    /// Stop accepting tasks, wait up to `drain` for in-flight ones, then close
    /// the browser. Tasks still running after the drain are abandoned with the runtime.
    pub async fn shutdown(&self, drain: Duration) {
        {
            let mut accepting = self.accepting.write().await;
            *accepting = false;
            self.tracker.close();
        }
        info!(in_flight = self.tracker.len(), "draining tasks");
        if tokio::time::timeout(drain, self.tracker.wait()).await.is_err() {
            warn!(
                in_flight = self.tracker.len(),
                drain_secs = drain.as_secs(),
                "drain timeout, abandoning in-flight tasks"
            );
        }
        self.resources.shutdown().await;
        info!("task manager stopped");
    }
}
