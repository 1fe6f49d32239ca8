mod error;
mod jobs;

pub use error::AdminError;

use crate::app_state::AppState;
use axum::{
  routing::{get, post},
  Router,
};

/// The scheduler's control surface: list jobs, run one on demand, pause/resume, and inspect a
/// job's execution history. Named and nested the way the teacher mounts its own `admin::router()`
/// under the app's API prefix.
pub fn router() -> Router<AppState> {
  return Router::new()
    .route("/jobs", get(jobs::list_jobs_handler))
    .route("/jobs/run", post(jobs::run_job_handler))
    .route("/jobs/{id}/executions", get(jobs::list_task_executions_handler))
    .route("/jobs/{id}/pause", post(jobs::pause_job_handler))
    .route("/jobs/{id}/resume", post(jobs::resume_job_handler));
}
