use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::admin::AdminError as Error;
use crate::app_state::AppState;

#[derive(Debug, Serialize)]
pub struct PauseJobResponse {
  pub id: String,
}

pub async fn pause_job_handler(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<Json<PauseJobResponse>, Error> {
  state.scheduler().pause_task(&id)?;
  return Ok(Json(PauseJobResponse { id }));
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::app_state::test_state;
  use crate::scheduler::error::JobError;
  use crate::scheduler::task::TaskStatus;
  use async_trait::async_trait;
  use std::time::Duration;

  struct Noop;

  #[async_trait]
  impl crate::scheduler::worker_pool::Job for Noop {
    async fn run(&self, _task_id: &str) -> std::result::Result<(), JobError> {
      return Ok(());
    }
  }

  #[tokio::test]
  async fn pauses_an_active_task() {
    let state = test_state().await;
    let id = state
      .scheduler()
      .schedule_every("demo", Duration::from_secs(3600), std::sync::Arc::new(Noop))
      .await
      .unwrap();

    let response = pause_job_handler(State(state.clone()), Path(id.clone())).await;
    assert!(response.is_ok(), "{response:?}");
    assert_eq!(state.scheduler().get_task(&id).unwrap().status, TaskStatus::Paused);
  }

  #[tokio::test]
  async fn unknown_task_is_not_found() {
    let state = test_state().await;
    let response = pause_job_handler(State(state), Path("missing".to_string())).await;
    assert!(response.is_err());
  }
}
