use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::admin::AdminError as Error;
use crate::app_state::AppState;
use crate::scheduler::execution::TaskExecution;
use crate::util::parse_limit;

#[derive(Debug, Deserialize)]
pub struct ListExecutionsQuery {
  pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListExecutionsResponse {
  pub executions: Vec<TaskExecution>,
}

pub async fn list_task_executions_handler(
  State(state): State<AppState>,
  Path(id): Path<String>,
  Query(query): Query<ListExecutionsQuery>,
) -> Result<Json<ListExecutionsResponse>, Error> {
  let executions = state
    .scheduler()
    .executions_for(&id, parse_limit(query.limit))
    .await?;
  return Ok(Json(ListExecutionsResponse { executions }));
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::app_state::test_state;
  use crate::scheduler::error::JobError;
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
  async fn lists_executions_after_a_manual_run() {
    let state = test_state().await;
    let id = state
      .scheduler()
      .schedule_every("demo", Duration::from_secs(3600), std::sync::Arc::new(Noop))
      .await
      .unwrap();

    state.scheduler().run_now(&id).await.unwrap();

    let mut response = list_task_executions_handler(
      State(state.clone()),
      Path(id.clone()),
      Query(ListExecutionsQuery { limit: None }),
    )
    .await
    .unwrap();
    for _ in 0..200 {
      if !response.executions.is_empty() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
      response = list_task_executions_handler(
        State(state.clone()),
        Path(id.clone()),
        Query(ListExecutionsQuery { limit: None }),
      )
      .await
      .unwrap();
    }

    assert_eq!(response.executions.len(), 1);
    assert_eq!(response.executions[0].task_id, id);
  }

  #[tokio::test]
  async fn unknown_task_has_no_executions() {
    let state = test_state().await;
    let response = list_task_executions_handler(
      State(state),
      Path("missing".to_string()),
      Query(ListExecutionsQuery { limit: None }),
    )
    .await
    .unwrap();
    assert!(response.executions.is_empty());
  }
}
