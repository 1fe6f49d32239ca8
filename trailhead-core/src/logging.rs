//! Logging bootstrap: `env_logger` drives the `log` facade the scheduler and `trailhead-sqlite`
//! use (matching the teacher's `scheduler.rs`/`connection.rs`, which both log through `log::*`),
//! while `tracing`/`tracing-subscriber` owns the HTTP request span the teacher's `logging.rs`
//! builds around `tower_http::trace::TraceLayer`.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes both logging facades from `AppConfig.log_level`. Safe to call more than once
/// per process (e.g. across tests) — a failing `try_init` is ignored rather than panicking.
pub fn init(log_level: &str) {
  let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = fmt().with_env_filter(filter).with_target(true).try_init();

  let _ =
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).try_init();
}

pub fn on_response(
  response: &axum::http::Response<axum::body::Body>,
  latency: std::time::Duration,
  _span: &tracing::Span,
) {
  tracing::info!(status = %response.status(), latency_ms = latency.as_millis(), "request completed");
}
