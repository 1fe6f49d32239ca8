//! A small demo MVC "pages" controller: renders `askama` templates, reads/writes the
//! `trailhead-sqlite`-backed `visits` counter, and looks up scheduler tasks by a validated id.
//! Exists to exercise the ambient HTTP layer (views, ORM, i18n, validation) alongside the
//! scheduler's own JSON admin surface.

use askama::Template;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Response};
use rust_i18n::t;
use serde::Deserialize;
use validator::Validate;

use crate::admin::AdminError as Error;
use crate::app_state::AppState;
use axum::routing::get;
use axum::Router;

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
  title: String,
  tagline: String,
  tasks: Vec<String>,
  visits: i64,
}

pub fn router() -> Router<AppState> {
  return Router::new()
    .route("/", get(home_handler))
    .route("/tasks/{id}", get(task_page_handler));
}

async fn home_handler(State(state): State<AppState>) -> Result<Response, Error> {
  let visits = bump_visit_counter(&state, "/").await?;

  let tasks = state
    .scheduler()
    .get_tasks()
    .into_iter()
    .map(|t| t.name)
    .collect();

  let template = HomeTemplate {
    title: t!("home.title").to_string(),
    tagline: t!("home.tagline").to_string(),
    tasks,
    visits,
  };

  return Ok(Html(template.render().map_err(|e| Error::BadRequest(e.to_string()))?).into_response());
}

#[derive(Debug, Deserialize, Validate)]
struct TaskPathParams {
  #[validate(length(min = 1))]
  id: String,
}

async fn task_page_handler(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<Response, Error> {
  let params = TaskPathParams { id };
  params.validate()?;

  let path = format!("/tasks/{}", params.id);
  let visits = bump_visit_counter(&state, &path).await?;

  let task = state.scheduler().get_task(&params.id);
  let tasks = match task {
    Some(t) => vec![format!("{} ({:?})", t.name, t.status)],
    None => vec!["no such task".to_string()],
  };

  let template = HomeTemplate {
    title: t!("home.title").to_string(),
    tagline: t!("home.tagline").to_string(),
    tasks,
    visits,
  };

  return Ok(Html(template.render().map_err(|e| Error::BadRequest(e.to_string()))?).into_response());
}

async fn bump_visit_counter(state: &AppState, path: &str) -> Result<i64, Error> {
  let path = path.to_string();
  state
    .db()
    .execute(
      "INSERT INTO visits (path, count) VALUES ($1, 1)
       ON CONFLICT(path) DO UPDATE SET count = count + 1",
      trailhead_sqlite::params!(path.clone()),
    )
    .await
    .map_err(|e| Error::BadRequest(e.to_string()))?;

  let row = state
    .db()
    .query_row("SELECT count FROM visits WHERE path = $1", trailhead_sqlite::params!(path))
    .await
    .map_err(|e| Error::BadRequest(e.to_string()))?;

  return match row {
    Some(row) => row.get::<i64>(0).map_err(|e| Error::BadRequest(e.to_string())),
    None => Ok(0),
  };
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::app_state::test_state;
  use axum::body::to_bytes;

  async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    return String::from_utf8(bytes.to_vec()).unwrap();
  }

  #[tokio::test]
  async fn home_page_renders_and_counts_visits() {
    let state = test_state().await;

    let first = home_handler(State(state.clone())).await.unwrap();
    assert!(body_text(first).await.contains("visits to this page: 1"));

    let second = home_handler(State(state)).await.unwrap();
    assert!(body_text(second).await.contains("visits to this page: 2"));
  }

  #[tokio::test]
  async fn task_page_reports_a_known_task() {
    use crate::scheduler::error::JobError;
    use async_trait::async_trait;

    struct Noop;
    #[async_trait]
    impl crate::scheduler::worker_pool::Job for Noop {
      async fn run(&self, _task_id: &str) -> std::result::Result<(), JobError> {
        return Ok(());
      }
    }

    let state = test_state().await;
    let id = state
      .scheduler()
      .schedule_every("demo", std::time::Duration::from_secs(60), std::sync::Arc::new(Noop))
      .await
      .unwrap();

    let response = task_page_handler(State(state), Path(id)).await.unwrap();
    assert!(body_text(response).await.contains("demo"));
  }

  #[tokio::test]
  async fn task_page_reports_missing_task() {
    let state = test_state().await;
    let response = task_page_handler(State(state), Path("missing".to_string()))
      .await
      .unwrap();
    assert!(body_text(response).await.contains("no such task"));
  }

  #[tokio::test]
  async fn task_page_rejects_empty_id() {
    let state = test_state().await;
    let response = task_page_handler(State(state), Path(String::new())).await;
    assert!(response.is_err());
  }
}
