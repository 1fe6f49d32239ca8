use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::admin::AdminError as Error;
use crate::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct RunJobRequest {
  pub id: String,
}

#[derive(Debug, Serialize)]
pub struct RunJobResponse {
  pub id: String,
}

/// Submits `id`'s job for immediate execution, outside its normal schedule.
pub async fn run_job_handler(
  State(state): State<AppState>,
  Json(request): Json<RunJobRequest>,
) -> Result<Json<RunJobResponse>, Error> {
  state.scheduler().run_now(&request.id).await?;
  return Ok(Json(RunJobResponse { id: request.id }));
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::app_state::test_state;
  use crate::scheduler::error::JobError;
  use crate::test::unpack_json_response;
  use async_trait::async_trait;
  use axum::response::IntoResponse;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  struct CountingJob {
    runs: Arc<AtomicU32>,
  }

  #[async_trait]
  impl crate::scheduler::worker_pool::Job for CountingJob {
    async fn run(&self, _task_id: &str) -> std::result::Result<(), JobError> {
      self.runs.fetch_add(1, Ordering::SeqCst);
      return Ok(());
    }
  }

  #[tokio::test]
  async fn runs_a_registered_job_immediately() {
    let state = test_state().await;
    let runs = Arc::new(AtomicU32::new(0));
    let id = state
      .scheduler()
      .schedule_every("demo", Duration::from_secs(3600), Arc::new(CountingJob { runs: runs.clone() }))
      .await
      .unwrap();

    let response = run_job_handler(State(state), Json(RunJobRequest { id: id.clone() })).await;
    assert!(response.is_ok(), "{response:?}");

    let body: RunJobResponse = unpack_json_response(response.unwrap().into_response())
      .await
      .unwrap();
    assert_eq!(body.id, id);
  }

  #[tokio::test]
  async fn unknown_task_is_rejected() {
    let state = test_state().await;
    let response = run_job_handler(
      State(state),
      Json(RunJobRequest {
        id: "does-not-exist".to_string(),
      }),
    )
    .await;
    assert!(response.is_err());
  }
}
