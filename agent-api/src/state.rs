use std::sync::Arc;

use crate::tasks::TaskLifecycleManager;

/// Shared by every request handler. Built once in `main`.
pub struct AppState {
    pub tasks: Arc<TaskLifecycleManager>,
}

impl AppState {
    pub fn new(tasks: Arc<TaskLifecycleManager>) -> Self {
        Self { tasks }
    }
}
