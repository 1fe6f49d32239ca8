use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::admin::AdminError as Error;
use crate::app_state::AppState;
use crate::scheduler::task::TaskStatus;

/// One row of the admin jobs listing: a task's static schedule info plus its rolling-window
/// run counts, mirroring the teacher's own `Job` DTO (id/name/schedule/enabled/next/latest)
/// but sourced from `Scheduler`/`Monitor` instead of the teacher's standalone cron jobs map.
#[derive(Debug, Serialize)]
pub struct JobSummary {
  pub id: String,
  pub name: String,
  pub schedule: String,
  pub status: TaskStatus,
  pub next_run: Option<DateTime<Utc>>,
  pub last_run: Option<DateTime<Utc>>,
  pub run_count: u64,
  pub fail_count: u64,
  pub runs_last_hour: u64,
  pub failures_last_hour: u64,
  pub consecutive_fails: u64,
  pub success_rate: f64,
  pub average_duration_secs: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
  pub jobs: Vec<JobSummary>,
}

pub async fn list_jobs_handler(
  State(state): State<AppState>,
) -> Result<Json<ListJobsResponse>, Error> {
  let monitor = state.scheduler().monitor();

  let jobs = state
    .scheduler()
    .get_tasks()
    .into_iter()
    .map(|task| {
      let window = monitor.task_window(&task.id);
      return JobSummary {
        id: task.id,
        name: task.name,
        schedule: schedule_to_string(&task.schedule),
        status: task.status,
        next_run: task.next_run,
        last_run: task.last_run,
        run_count: task.run_count,
        fail_count: task.fail_count,
        runs_last_hour: window.runs_last_hour,
        failures_last_hour: window.failures_last_hour,
        consecutive_fails: window.consecutive_fails,
        success_rate: window.success_rate,
        average_duration_secs: window.average_duration.map(|d| d.as_secs_f64()),
      };
    })
    .collect();

  return Ok(Json(ListJobsResponse { jobs }));
}

fn schedule_to_string(schedule: &crate::scheduler::task::Schedule) -> String {
  use crate::scheduler::task::Schedule;
  return match schedule {
    Schedule::Cron { expression, .. } => expression.clone(),
    Schedule::Every { interval } => format!("every {interval:?}"),
    Schedule::Once { at } => format!("once at {at}"),
  };
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
  async fn lists_registered_tasks() {
    let state = test_state().await;
    let id = state
      .scheduler()
      .schedule_every("demo", Duration::from_secs(60), std::sync::Arc::new(Noop))
      .await
      .unwrap();

    let response = list_jobs_handler(State(state)).await.unwrap();
    assert_eq!(response.jobs.len(), 1);
    assert_eq!(response.jobs[0].id, id);
    assert_eq!(response.jobs[0].name, "demo");
  }

  #[tokio::test]
  async fn empty_scheduler_lists_no_jobs() {
    let state = test_state().await;
    let response = list_jobs_handler(State(state)).await.unwrap();
    assert!(response.jobs.is_empty());
  }
}
