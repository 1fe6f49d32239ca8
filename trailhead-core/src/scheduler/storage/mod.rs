pub mod directory;
pub mod memory;

use crate::scheduler::error::Result;
use crate::scheduler::execution::TaskExecution;
use crate::scheduler::task::Task;
use async_trait::async_trait;

pub use directory::DirectoryStorage;
pub use memory::MemoryStorage;

/// Durable persistence for tasks and their execution history.
///
/// Every method is phrased as "best-effort, logged on failure" by the scheduler that calls it:
/// none of these errors abort a tick or a task mutation in flight, they're surfaced through
/// `StorageError` only at the public API boundary (e.g. `Scheduler::add_task`). Implementations
/// are free to do blocking I/O internally as long as it's offloaded (see `DirectoryStorage`,
/// which runs everything through `tokio::task::spawn_blocking`).
#[async_trait]
pub trait Storage: Send + Sync {
  async fn save_task(&self, task: &Task) -> Result<()>;
  async fn load_task(&self, id: &str) -> Result<Option<Task>>;
  async fn load_all_tasks(&self) -> Result<Vec<Task>>;
  async fn delete_task(&self, id: &str) -> Result<()>;

  async fn save_execution(&self, execution: &TaskExecution) -> Result<()>;
  async fn load_executions(&self, task_id: &str, limit: usize) -> Result<Vec<TaskExecution>>;
  async fn load_all_executions(&self) -> Result<Vec<TaskExecution>>;
  async fn delete_executions_for_task(&self, task_id: &str) -> Result<()>;
}
