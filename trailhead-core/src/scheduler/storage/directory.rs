use crate::scheduler::error::{Result, StorageError};
use crate::scheduler::execution::TaskExecution;
use crate::scheduler::storage::Storage;
use crate::scheduler::task::Task;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A `Storage` backend that writes one JSON file per task under `<root>/tasks/` and one JSON
/// file per execution under `<root>/executions/<task_id>/`, matching the teacher's data-dir
/// convention of a directory tree of small JSON documents rather than a single database file.
///
/// All filesystem access runs through `tokio::task::spawn_blocking` so a slow disk never stalls
/// the scheduler's tick loop.
#[derive(Clone)]
pub struct DirectoryStorage {
  root: PathBuf,
}

impl DirectoryStorage {
  pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
    let root = root.into();
    let tasks_dir = root.join("tasks");
    let executions_dir = root.join("executions");
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
      std::fs::create_dir_all(&tasks_dir)?;
      std::fs::create_dir_all(&executions_dir)?;
      return Ok(());
    })
    .await
    .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

    return Ok(Self { root });
  }

  fn tasks_dir(&self) -> PathBuf {
    return self.root.join("tasks");
  }

  fn task_path(&self, id: &str) -> PathBuf {
    return self.tasks_dir().join(format!("{id}.json"));
  }

  fn executions_dir_for(&self, task_id: &str) -> PathBuf {
    return self.root.join("executions").join(task_id);
  }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> std::result::Result<Option<T>, StorageError> {
  match std::fs::read(path) {
    Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(StorageError::Io(e)),
  }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> std::result::Result<(), StorageError> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  let bytes = serde_json::to_vec_pretty(value)?;
  std::fs::write(path, bytes)?;
  return Ok(());
}

fn list_json_files(dir: &Path) -> std::result::Result<Vec<PathBuf>, StorageError> {
  match std::fs::read_dir(dir) {
    Ok(entries) => {
      let mut paths = Vec::new();
      for entry in entries {
        let entry = entry.map_err(StorageError::Io)?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
          paths.push(path);
        }
      }
      Ok(paths)
    }
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
    Err(e) => Err(StorageError::Io(e)),
  }
}

#[async_trait]
impl Storage for DirectoryStorage {
  async fn save_task(&self, task: &Task) -> Result<()> {
    let path = self.task_path(&task.id);
    let task = task.clone();
    return tokio::task::spawn_blocking(move || write_json(&path, &task))
      .await
      .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;
  }

  async fn load_task(&self, id: &str) -> Result<Option<Task>> {
    let path = self.task_path(id);
    return tokio::task::spawn_blocking(move || read_json(&path))
      .await
      .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;
  }

  async fn load_all_tasks(&self) -> Result<Vec<Task>> {
    let dir = self.tasks_dir();
    return tokio::task::spawn_blocking(move || -> Result<Vec<Task>> {
      let mut tasks = Vec::new();
      for path in list_json_files(&dir)? {
        if let Some(task) = read_json(&path)? {
          tasks.push(task);
        }
      }
      Ok(tasks)
    })
    .await
    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
  }

  async fn delete_task(&self, id: &str) -> Result<()> {
    let path = self.task_path(id);
    return tokio::task::spawn_blocking(move || match std::fs::remove_file(path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(StorageError::Io(e).into()),
    })
    .await
    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
  }

  async fn save_execution(&self, execution: &TaskExecution) -> Result<()> {
    let path = self
      .executions_dir_for(&execution.task_id)
      .join(format!("{}.json", execution.id));
    let execution = execution.clone();
    return tokio::task::spawn_blocking(move || write_json(&path, &execution))
      .await
      .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;
  }

  async fn load_executions(&self, task_id: &str, limit: usize) -> Result<Vec<TaskExecution>> {
    let mut all = self.load_all_for_task(task_id).await?;
    all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    if limit != 0 && limit < all.len() {
      all.truncate(limit);
    }
    return Ok(all);
  }

  async fn load_all_executions(&self) -> Result<Vec<TaskExecution>> {
    let root = self.root.join("executions");
    return tokio::task::spawn_blocking(move || -> Result<Vec<TaskExecution>> {
      let mut all = Vec::new();
      let Ok(task_dirs) = std::fs::read_dir(&root) else {
        return Ok(all);
      };
      for entry in task_dirs {
        let entry = entry.map_err(StorageError::Io)?;
        if !entry.path().is_dir() {
          continue;
        }
        for path in list_json_files(&entry.path())? {
          if let Some(exec) = read_json(&path)? {
            all.push(exec);
          }
        }
      }
      Ok(all)
    })
    .await
    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
  }

  async fn delete_executions_for_task(&self, task_id: &str) -> Result<()> {
    let dir = self.executions_dir_for(task_id);
    return tokio::task::spawn_blocking(move || match std::fs::remove_dir_all(dir) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(StorageError::Io(e).into()),
    })
    .await
    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
  }
}

impl DirectoryStorage {
  async fn load_all_for_task(&self, task_id: &str) -> Result<Vec<TaskExecution>> {
    let dir = self.executions_dir_for(task_id);
    return tokio::task::spawn_blocking(move || -> Result<Vec<TaskExecution>> {
      let mut all = Vec::new();
      for path in list_json_files(&dir)? {
        if let Some(exec) = read_json(&path)? {
          all.push(exec);
        }
      }
      Ok(all)
    })
    .await
    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scheduler::task::Schedule;
  use chrono::Utc;

  #[tokio::test]
  async fn round_trips_a_task_through_json_files() {
    let dir = tempfile::tempdir().unwrap();
    let storage = DirectoryStorage::open(dir.path()).await.unwrap();
    let task = Task::new("t1", "demo", Schedule::every(std::time::Duration::from_secs(60)), Utc::now());
    storage.save_task(&task).await.unwrap();

    let loaded = storage.load_task("t1").await.unwrap().unwrap();
    assert_eq!(loaded.id, "t1");
    assert!(dir.path().join("tasks").join("t1.json").exists());

    storage.delete_task("t1").await.unwrap();
    assert!(storage.load_task("t1").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn executions_are_most_recent_first_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let storage = DirectoryStorage::open(dir.path()).await.unwrap();

    let now = Utc::now();
    let first = TaskExecution::start("t1", "demo", "worker-0", 0, now);
    let second = TaskExecution::start("t1", "demo", "worker-0", 1, now + chrono::Duration::seconds(1));
    storage.save_execution(&second).await.unwrap();
    storage.save_execution(&first).await.unwrap();

    let loaded = storage.load_executions("t1", 10).await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].retry_count, 1);
    assert_eq!(loaded[1].retry_count, 0);
  }
}
