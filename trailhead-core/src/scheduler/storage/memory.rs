use crate::scheduler::error::Result;
use crate::scheduler::execution::TaskExecution;
use crate::scheduler::storage::Storage;
use crate::scheduler::task::Task;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory `Storage` backend, mainly for tests and for running the scheduler with no
/// durability. Every getter returns a deep copy so callers can never observe or mutate the
/// storage's internal state through a returned value.
#[derive(Default)]
pub struct MemoryStorage {
  tasks: RwLock<HashMap<String, Task>>,
  executions: RwLock<HashMap<String, Vec<TaskExecution>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    return Self::default();
  }
}

#[async_trait]
impl Storage for MemoryStorage {
  async fn save_task(&self, task: &Task) -> Result<()> {
    self.tasks.write().insert(task.id.clone(), task.clone());
    return Ok(());
  }

  async fn load_task(&self, id: &str) -> Result<Option<Task>> {
    return Ok(self.tasks.read().get(id).cloned());
  }

  async fn load_all_tasks(&self) -> Result<Vec<Task>> {
    return Ok(self.tasks.read().values().cloned().collect());
  }

  async fn delete_task(&self, id: &str) -> Result<()> {
    self.tasks.write().remove(id);
    return Ok(());
  }

  async fn save_execution(&self, execution: &TaskExecution) -> Result<()> {
    self
      .executions
      .write()
      .entry(execution.task_id.clone())
      .or_default()
      .push(execution.clone());
    return Ok(());
  }

  async fn load_executions(&self, task_id: &str, limit: usize) -> Result<Vec<TaskExecution>> {
    let guard = self.executions.read();
    let Some(all) = guard.get(task_id) else {
      return Ok(Vec::new());
    };
    let mut recent: Vec<TaskExecution> = all.iter().rev().cloned().collect();
    if limit != 0 && limit < recent.len() {
      recent.truncate(limit);
    }
    return Ok(recent);
  }

  async fn load_all_executions(&self) -> Result<Vec<TaskExecution>> {
    return Ok(self.executions.read().values().flatten().cloned().collect());
  }

  async fn delete_executions_for_task(&self, task_id: &str) -> Result<()> {
    self.executions.write().remove(task_id);
    return Ok(());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scheduler::task::Schedule;
  use chrono::Utc;

  #[tokio::test]
  async fn round_trips_a_task() {
    let storage = MemoryStorage::new();
    let task = Task::new("t1", "demo", Schedule::every(std::time::Duration::from_secs(60)), Utc::now());
    storage.save_task(&task).await.unwrap();

    let loaded = storage.load_task("t1").await.unwrap().unwrap();
    assert_eq!(loaded.id, "t1");

    storage.delete_task("t1").await.unwrap();
    assert!(storage.load_task("t1").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn caps_execution_history_by_limit_most_recent_first() {
    let storage = MemoryStorage::new();
    for i in 0..5 {
      let exec = TaskExecution::start("t1", "demo", "worker-0", i, Utc::now());
      storage.save_execution(&exec).await.unwrap();
    }
    let recent = storage.load_executions("t1", 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].retry_count, 4);
    assert_eq!(recent[1].retry_count, 3);
  }

  #[tokio::test]
  async fn zero_limit_means_unbounded() {
    let storage = MemoryStorage::new();
    for i in 0..5 {
      let exec = TaskExecution::start("t1", "demo", "worker-0", i, Utc::now());
      storage.save_execution(&exec).await.unwrap();
    }
    let all = storage.load_executions("t1", 0).await.unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(all[0].retry_count, 4);
  }
}
