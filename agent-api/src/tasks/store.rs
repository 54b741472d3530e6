use std::collections::HashMap;

use shared_types::TaskStatus;
use tokio::sync::RwLock;

use super::record::{TaskId, TaskRecord};
use crate::error::TaskError;

/// In-memory task table. Records are never removed.
#[derive(Default)]
pub struct TaskStore {
    records: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `pending` record and return its id.
    pub async fn create(&self, task_text: impl Into<String>) -> TaskId {
        let task_text = task_text.into();
        let mut records = self.records.write().await;
        let mut id = TaskId::new();
        while records.contains_key(&id) {
            id = TaskId::new();
        }
        records.insert(id, TaskRecord::new(id, task_text));
        id
    }

    pub async fn get(&self, id: TaskId) -> Result<TaskRecord, TaskError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    /// Every id, oldest first.
    pub async fn list(&self) -> Vec<TaskId> {
        let records = self.records.read().await;
        let mut entries: Vec<_> = records
            .values()
            .map(|record| (record.created_at(), record.id()))
            .collect();
        entries.sort();
        entries.into_iter().map(|(_, id)| id).collect()
    }

    /// Apply `mutator` to a copy of the record and store it only if the
    /// mutator succeeds. Readers see the old or the new record, never a mix.
    pub async fn update<F>(&self, id: TaskId, mutator: F) -> Result<TaskRecord, TaskError>
    where
        F: FnOnce(&mut TaskRecord) -> Result<(), TaskError>,
    {
        let mut records = self.records.write().await;
        let current = records
            .get(&id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        let mut next = current.clone();
        mutator(&mut next)?;
        records.insert(id, next.clone());
        Ok(next)
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn count_with_status(&self, status: TaskStatus) -> usize {
        self.records
            .read()
            .await
            .values()
            .filter(|record| record.status() == status)
            .count()
    }
}
