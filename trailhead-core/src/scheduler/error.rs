use thiserror::Error;

/// Errors surfaced by the scheduler's public control surface and its internals.
///
/// Storage and callback failures never reach a caller through this type — they're logged and
/// swallowed at the point of occurrence (see module docs on `Storage`). This enum is for errors
/// a caller is expected to act on.
#[derive(Debug, Error)]
pub enum SchedulerError {
  #[error("invalid schedule '{0}': {1}")]
  Parse(String, String),
  #[error("task not found: {0}")]
  NotFound(String),
  #[error("task already exists: {0}")]
  AlreadyExists(String),
  #[error("worker queue is full")]
  QueueFull,
  #[error("scheduler is not running")]
  NotRunning,
  #[error("scheduler is already running")]
  AlreadyRunning,
  #[error("job for task '{0}' is not registered")]
  JobNotRegistered(String),
  #[error("task '{0}' rejected by the execution strategy")]
  Throttled(String),
  #[error("storage error: {0}")]
  Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// I/O or (de)serialization failure from a `Storage` implementation.
///
/// Never halts the scheduler: callers that see this at the public API boundary (e.g.
/// `Scheduler::add_task` writing through to storage) may act on it, but the scheduler's own
/// tick loop logs and continues on a `StorageError` instead of propagating it.
#[derive(Debug, Error)]
pub enum StorageError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("serialization error: {0}")]
  Serde(#[from] serde_json::Error),
  #[error("not found: {0}")]
  NotFound(String),
}

/// The error a job's `run` returns. Carries enough context to drive retry/terminal-failure
/// logic and to report through `TaskExecution::last_error` and the admin API.
#[derive(Debug, Error, Clone)]
pub enum JobError {
  #[error("{0}")]
  Failed(String),
  #[error("job panicked: {0}")]
  Panic(String),
  #[error("job timed out after {0:?}")]
  Timeout(std::time::Duration),
  #[error("job canceled")]
  Canceled,
}

impl JobError {
  pub fn message(&self) -> String {
    return self.to_string();
  }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for JobError {
  fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
    return JobError::Failed(err.to_string());
  }
}
