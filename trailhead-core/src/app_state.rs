//! The `Arc`-wrapped, `Clone`-cheap application handle threaded through axum's `State` extractor.
//!
//! Mirrors the teacher's `AppState` (an `Arc<InternalState>` wrapper kept small and cheap to
//! clone per request) but scoped to what this crate actually carries: the data directory, the
//! resolved config, the scheduler handle, and the demo ORM connection.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::data_dir::DataDir;
use crate::scheduler::scheduler::Scheduler;

struct InternalState {
  data_dir: DataDir,
  config: AppConfig,
  scheduler: Arc<Scheduler>,
  db: trailhead_sqlite::Connection,
}

#[derive(Clone)]
pub struct AppState {
  state: Arc<InternalState>,
}

impl AppState {
  pub(crate) fn new(
    data_dir: DataDir,
    config: AppConfig,
    scheduler: Arc<Scheduler>,
    db: trailhead_sqlite::Connection,
  ) -> Self {
    return Self {
      state: Arc::new(InternalState {
        data_dir,
        config,
        scheduler,
        db,
      }),
    };
  }

  pub fn data_dir(&self) -> &DataDir {
    return &self.state.data_dir;
  }

  pub fn config(&self) -> &AppConfig {
    return &self.state.config;
  }

  pub fn scheduler(&self) -> &Arc<Scheduler> {
    return &self.state.scheduler;
  }

  pub fn db(&self) -> &trailhead_sqlite::Connection {
    return &self.state.db;
  }
}

#[cfg(test)]
pub(crate) async fn test_state() -> AppState {
  use crate::scheduler::clock::system_clock;
  use crate::scheduler::scheduler::SchedulerOptions;
  use crate::scheduler::storage::MemoryStorage;

  let scheduler = Arc::new(Scheduler::new(
    Arc::new(MemoryStorage::new()),
    SchedulerOptions {
      clock: system_clock(),
      ..SchedulerOptions::default()
    },
  ));
  scheduler.start().await.unwrap();

  let db = trailhead_sqlite::Connection::open_in_memory().unwrap();
  db.execute(
    "CREATE TABLE IF NOT EXISTS visits (path TEXT PRIMARY KEY, count INTEGER NOT NULL DEFAULT 0)",
    (),
  )
  .await
  .unwrap();

  return AppState::new(
    DataDir(std::env::temp_dir()),
    AppConfig::default(),
    scheduler,
    db,
  );
}
