use crate::scheduler::worker_pool::Job;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps task ids to the `Job` that should run when they fire. Kept separate from `Task` itself
/// so persisted task state (schedule, retry policy, timestamps) never needs to serialize a
/// trait object — jobs are re-registered by the process that owns them on every startup.
#[derive(Default)]
pub struct JobRegistry {
  jobs: RwLock<HashMap<String, Arc<dyn Job>>>,
}

impl JobRegistry {
  pub fn new() -> Self {
    return Self::default();
  }

  pub fn register(&self, task_id: impl Into<String>, job: Arc<dyn Job>) {
    self.jobs.write().insert(task_id.into(), job);
  }

  pub fn unregister(&self, task_id: &str) {
    self.jobs.write().remove(task_id);
  }

  pub fn get(&self, task_id: &str) -> Option<Arc<dyn Job>> {
    return self.jobs.read().get(task_id).cloned();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scheduler::error::JobError;
  use async_trait::async_trait;

  struct Noop;

  #[async_trait]
  impl Job for Noop {
    async fn run(&self, _task_id: &str) -> std::result::Result<(), JobError> {
      return Ok(());
    }
  }

  #[test]
  fn register_lookup_and_unregister() {
    let registry = JobRegistry::new();
    registry.register("t1", Arc::new(Noop));
    assert!(registry.get("t1").is_some());

    registry.unregister("t1");
    assert!(registry.get("t1").is_none());
  }
}
