use log::*;
use std::sync::Arc;
use thiserror::Error;

use crate::app_state::AppState;
use crate::config::{self, ConfigError};
use crate::data_dir::DataDir;
use crate::scheduler::clock::system_clock;
use crate::scheduler::scheduler::{Scheduler, SchedulerOptions};
use crate::scheduler::storage::DirectoryStorage;

#[derive(Debug, Error)]
pub enum InitError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Config error: {0}")]
  Config(#[from] ConfigError),
  #[error("Sqlite error: {0}")]
  Sqlite(#[from] trailhead_sqlite::Error),
  #[error("Scheduler error: {0}")]
  Scheduler(#[from] crate::scheduler::error::SchedulerError),
}

/// Creates the data directory (first run only), loads or initializes `config.toml`, opens the
/// demo ORM connection, and builds a `DirectoryStorage`-backed `Scheduler` tuned from config.
/// Mirrors the teacher's `init_app_state` in shape: one function that produces a ready-to-serve
/// `AppState`.
pub async fn init_app_state(data_dir: DataDir) -> Result<AppState, InitError> {
  data_dir.ensure_directory_structure().await?;

  let config = config::load_or_init_config(&data_dir).await?;

  let db = trailhead_sqlite::Connection::open(data_dir.db_path())?;
  db.execute(
    "CREATE TABLE IF NOT EXISTS visits (path TEXT PRIMARY KEY, count INTEGER NOT NULL DEFAULT 0)",
    (),
  )
  .await?;

  let storage = Arc::new(DirectoryStorage::open(data_dir.scheduler_path()).await?);
  let scheduler = Arc::new(Scheduler::new(
    storage,
    SchedulerOptions {
      tick_interval: config.scheduler.tick_interval(),
      num_workers: config.scheduler.workers,
      queue_capacity: config.scheduler.queue_capacity,
      clock: system_clock(),
    },
  ));
  scheduler.start().await.inspect_err(|err| {
    error!("failed to start scheduler: {err}");
  })?;

  info!("initialized data dir at {:?}", data_dir.root());

  return Ok(AppState::new(data_dir, config, scheduler, db));
}
