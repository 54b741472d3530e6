//! Runs one task end to end as a detached unit of background work.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use shared_types::TaskResult;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::record::TaskId;
use super::store::TaskStore;
use crate::agent::SharedAgent;
use crate::error::TaskError;
use crate::resources::ResourceProvisioner;

pub struct TaskExecutor {
    store: Arc<TaskStore>,
    resources: Arc<ResourceProvisioner>,
    agent: SharedAgent,
    /// Held for the whole agent run. One agent drives the shared browser at a time.
    agent_lock: Mutex<()>,
    task_timeout: Option<Duration>,
}

impl TaskExecutor {
    pub fn new(
        store: Arc<TaskStore>,
        resources: Arc<ResourceProvisioner>,
        agent: SharedAgent,
        task_timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            resources,
            agent,
            agent_lock: Mutex::new(()),
            task_timeout,
        }
    }

    /// Drive task `id` to a terminal state. Never returns an error and never
    /// panics: every failure ends up in the record.
    pub async fn execute(&self, id: TaskId, task_text: String) {
        if let Err(e) = self.store.update(id, |record| record.start()).await {
            error!(task_id = %id, error = %e, "cannot start task, aborting execution");
            return;
        }
        info!(task_id = %id, "task running");

        let outcome = AssertUnwindSafe(self.run(id, &task_text))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(TaskError::ExecutionFailure(format!(
                    "agent panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        let finalized = match outcome {
            Ok(result) => {
                let update = self.store.update(id, |record| record.complete(result)).await;
                if update.is_ok() {
                    info!(task_id = %id, "task completed");
                }
                update
            }
            Err(e) => {
                warn!(task_id = %id, error = %e, "task failed");
                self.store
                    .update(id, |record| record.fail(e.to_string()))
                    .await
            }
        };

        if let Err(e) = finalized {
            error!(task_id = %id, error = %e, "failed to record task outcome");
        }
    }

    async fn run(&self, id: TaskId, task_text: &str) -> Result<TaskResult, TaskError> {
        let browser = self.resources.get_browser().await?;
        let llm = self.resources.get_llm().await?;

        let _guard = self.agent_lock.lock().await;
        debug!(task_id = %id, model = llm.model(), "agent run starting");

        let run = self.agent.run(task_text, llm, browser);
        let output = match self.task_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| TaskError::Timeout(limit.as_secs()))??,
            None => run.await?,
        };
        debug!(task_id = %id, steps = output.steps, "agent run finished");

        Ok(TaskResult {
            success: true,
            usage: output.usage,
            final_result: output.final_result,
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
