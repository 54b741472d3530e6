//! Task identity and the per-task state machine.
//!
//! `pending -> running -> {completed, failed}`. Terminal records reject every
//! further transition, and `result` / `error` are only ever set together with
//! the matching terminal status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use shared_types::{TaskResult, TaskStatus, TaskStatusResponse};
use uuid::Uuid;

use crate::error::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Random 128-bit identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| TaskError::NotFound(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    id: TaskId,
    status: TaskStatus,
    task_text: String,
    result: Option<TaskResult>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(id: TaskId, task_text: impl Into<String>) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            task_text: task_text.into(),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn task_text(&self) -> &str {
        &self.task_text
    }

    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `pending -> running`
    pub fn start(&mut self) -> Result<(), TaskError> {
        self.ensure(self.status == TaskStatus::Pending, TaskStatus::Running)?;
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `running -> completed`
    pub fn complete(&mut self, result: TaskResult) -> Result<(), TaskError> {
        self.ensure(self.status == TaskStatus::Running, TaskStatus::Completed)?;
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// `running -> failed`. An empty message is replaced so a failed record
    /// always explains itself.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TaskError> {
        self.ensure(self.status == TaskStatus::Running, TaskStatus::Failed)?;
        let error = error.into();
        self.status = TaskStatus::Failed;
        self.error = Some(if error.trim().is_empty() {
            "task failed without an error message".to_string()
        } else {
            error
        });
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn ensure(&self, allowed: bool, to: TaskStatus) -> Result<(), TaskError> {
        if allowed {
            Ok(())
        } else {
            Err(TaskError::InvalidTransition {
                task_id: self.id.to_string(),
                from: self.status,
                to,
            })
        }
    }

    pub fn to_response(&self) -> TaskStatusResponse {
        TaskStatusResponse {
            task_id: self.id.to_string(),
            status: self.status,
            result: self.result.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_result() -> TaskResult {
        TaskResult {
            success: true,
            usage: None,
            final_result: None,
        }
    }

    #[test]
    fn test_new_record_is_pending_and_empty() {
        let record = TaskRecord::new(TaskId::new(), "go to example.com");
        assert_eq!(record.status(), TaskStatus::Pending);
        assert_eq!(record.task_text(), "go to example.com");
        assert!(record.result().is_none());
        assert!(record.error().is_none());
    }

    #[test]
    fn test_happy_path_sets_result_only() {
        let mut record = TaskRecord::new(TaskId::new(), "t");
        record.start().unwrap();
        assert_eq!(record.status(), TaskStatus::Running);
        record.complete(ok_result()).unwrap();

        let response = record.to_response();
        assert_eq!(response.status, TaskStatus::Completed);
        assert!(response.result.is_some());
        assert!(response.error.is_none());
        assert!(response.started_at.is_some());
        assert!(response.finished_at >= response.started_at);
    }

    #[test]
    fn test_terminal_records_reject_every_transition() {
        let mut failed = TaskRecord::new(TaskId::new(), "t");
        failed.start().unwrap();
        failed.fail("boom").unwrap();
        let snapshot = failed.clone();

        assert!(failed.start().is_err());
        assert!(failed.complete(ok_result()).is_err());
        assert!(failed.fail("again").is_err());
        assert_eq!(failed, snapshot);

        let mut completed = TaskRecord::new(TaskId::new(), "t");
        completed.start().unwrap();
        completed.complete(ok_result()).unwrap();
        let err = completed.fail("late").unwrap_err();
        assert!(matches!(
            err,
            TaskError::InvalidTransition {
                from: TaskStatus::Completed,
                to: TaskStatus::Failed,
                ..
            }
        ));
        assert!(completed.error().is_none());
    }

    #[test]
    fn test_pending_must_start_before_finishing() {
        let mut record = TaskRecord::new(TaskId::new(), "t");
        assert!(record.complete(ok_result()).is_err());
        let err = record.fail("browser unavailable").unwrap_err();
        assert!(matches!(
            err,
            TaskError::InvalidTransition {
                from: TaskStatus::Pending,
                to: TaskStatus::Failed,
                ..
            }
        ));
        assert_eq!(record.status(), TaskStatus::Pending);
        assert!(record.error().is_none());
    }

    #[test]
    fn test_empty_failure_message_is_replaced() {
        let mut record = TaskRecord::new(TaskId::new(), "t");
        record.start().unwrap();
        record.fail("  ").unwrap();
        assert!(!record.error().unwrap().trim().is_empty());
    }

    #[test]
    fn test_task_id_parsing() {
        let id = TaskId::new();
        assert_eq!(id.to_string().parse::<TaskId>().unwrap(), id);
        assert!(matches!(
            "not-a-uuid".parse::<TaskId>(),
            Err(TaskError::NotFound(_))
        ));
        assert_ne!(TaskId::new(), TaskId::new());
    }
}
