use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, StatusCode};
use axum::response::{IntoResponse, Response};
use log::*;
use thiserror::Error;

use crate::scheduler::error::SchedulerError;

/// Wraps scheduler errors (and the admin layer's own request validation failures) for the HTTP
/// boundary. Mirrors the teacher's `admin::AdminError` in shape: a flat enum of the failure modes
/// the admin surface can produce, each mapped to a status code in `into_response`.
#[derive(Debug, Error)]
pub enum AdminError {
  #[error("Bad request: {0}")]
  BadRequest(String),
  #[error(transparent)]
  Scheduler(#[from] SchedulerError),
}

impl From<validator::ValidationErrors> for AdminError {
  fn from(err: validator::ValidationErrors) -> Self {
    return AdminError::BadRequest(err.to_string());
  }
}

impl IntoResponse for AdminError {
  fn into_response(self) -> Response {
    let (status, msg) = match &self {
      Self::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
      Self::Scheduler(SchedulerError::NotFound(_)) => (StatusCode::NOT_FOUND, self.to_string()),
      Self::Scheduler(SchedulerError::AlreadyExists(_)) => {
        (StatusCode::CONFLICT, self.to_string())
      }
      Self::Scheduler(SchedulerError::Parse(_, _)) => (StatusCode::BAD_REQUEST, self.to_string()),
      Self::Scheduler(SchedulerError::JobNotRegistered(_)) => {
        (StatusCode::BAD_REQUEST, self.to_string())
      }
      Self::Scheduler(SchedulerError::QueueFull) => {
        (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
      }
      Self::Scheduler(SchedulerError::Throttled(_)) => {
        (StatusCode::TOO_MANY_REQUESTS, self.to_string())
      }
      // NOTE: We can almost always leak the internal error since these are errors for the admin
      // apis.
      Self::Scheduler(other) => {
        error!("admin API scheduler error: {other}");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
      }
    };

    return Response::builder()
      .status(status)
      .header(CONTENT_TYPE, "text/plain")
      .body(Body::new(msg))
      .unwrap();
  }
}
