use crate::scheduler::error::JobError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration as StdDuration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
  Running,
  Succeeded,
  Failed,
  TimedOut,
  Canceled,
}

/// A single attempt at running a task's job, including retries: each retry of the same firing
/// gets its own `TaskExecution` with the same `task_id` and an incrementing `retry_count`
/// (0 for the first attempt).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
  pub id: String,
  pub task_id: String,
  pub task_name: String,
  pub worker_id: String,
  pub retry_count: u32,
  pub status: ExecutionStatus,
  pub started_at: DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
  pub duration: Option<StdDuration>,
  pub last_error: Option<String>,
  /// Set when the terminal error was a caught job panic, distinct from an ordinary `Failed`
  /// so `Monitor` can track `panic_count` separately from `total_failures`.
  #[serde(default)]
  pub is_panic: bool,
  #[serde(default)]
  pub metadata: HashMap<String, String>,
}

impl TaskExecution {
  pub fn start(
    task_id: impl Into<String>,
    task_name: impl Into<String>,
    worker_id: impl Into<String>,
    retry_count: u32,
    started_at: DateTime<Utc>,
  ) -> Self {
    return Self {
      id: Uuid::new_v4().to_string(),
      task_id: task_id.into(),
      task_name: task_name.into(),
      worker_id: worker_id.into(),
      retry_count,
      status: ExecutionStatus::Running,
      started_at,
      finished_at: None,
      duration: None,
      last_error: None,
      is_panic: false,
      metadata: HashMap::new(),
    };
  }

  pub fn succeed(&mut self, finished_at: DateTime<Utc>) {
    self.status = ExecutionStatus::Succeeded;
    self.finished_at = Some(finished_at);
    self.duration = (finished_at - self.started_at).to_std().ok();
    self.last_error = None;
    self.is_panic = false;
  }

  pub fn fail(&mut self, error: &JobError, finished_at: DateTime<Utc>) {
    self.status = match error {
      JobError::Timeout(_) => ExecutionStatus::TimedOut,
      JobError::Canceled => ExecutionStatus::Canceled,
      JobError::Failed(_) | JobError::Panic(_) => ExecutionStatus::Failed,
    };
    self.finished_at = Some(finished_at);
    self.duration = (finished_at - self.started_at).to_std().ok();
    self.last_error = Some(error.message());
    self.is_panic = matches!(error, JobError::Panic(_));
  }
}
