mod init;

use axum::extract::MatchedPath;
use axum::http::{HeaderValue, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::time::Duration;
use tokio::signal;
use tower_http::cors;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::app_state::AppState;
use crate::config::AppConfig;
use crate::logging;
use crate::pages;

pub use init::{init_app_state, InitError};

/// Builds the single `Router<AppState>` the teacher's own `Server::build_main_router` mirrors:
/// a health check, the demo pages controller, and the scheduler's admin surface nested under
/// `/api/_admin`.
pub fn build_router(state: &AppState) -> Router<()> {
  let router = Router::new()
    .route("/api/healthcheck", get(healthcheck_handler))
    .nest("/", pages::router())
    .nest(
      &format!("/{}", crate::constants::ADMIN_API_PATH),
      admin::router(),
    );

  return wrap_with_default_layers(state, router);
}

fn wrap_with_default_layers(state: &AppState, router: Router<AppState>) -> Router<()> {
  return router
    .layer(build_cors(state.config()))
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
          let path = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str)
            .unwrap_or_else(|| request.uri().path());
          tracing::info_span!("http", method = %request.method(), path)
        })
        .on_response(|response: &Response, latency: Duration, span: &tracing::Span| {
          logging::on_response(response, latency, span);
        }),
    )
    .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024))
    .with_state(state.clone());
}

fn build_cors(config: &AppConfig) -> cors::CorsLayer {
  let origins = &config.cors_allowed_origins;
  if origins.iter().any(|o| o == "*") {
    return cors::CorsLayer::new()
      .allow_methods(cors::Any)
      .allow_origin(cors::AllowOrigin::mirror_request());
  }

  return cors::CorsLayer::new().allow_methods(cors::Any).allow_origin(
    cors::AllowOrigin::list(origins.iter().filter_map(|o| HeaderValue::from_str(o).ok())),
  );
}

async fn healthcheck_handler() -> Response {
  return (axum::http::StatusCode::OK, "Ok").into_response();
}

/// Starts listening on `AppConfig.bind_address`, serving until a Ctrl+C/SIGTERM is received.
pub async fn serve(state: AppState) -> std::io::Result<()> {
  let router = build_router(&state);
  let addr = state.config().bind_address.clone();

  let listener = tokio::net::TcpListener::bind(&addr).await?;
  log::info!("listening on http://{addr}");

  return axum::serve(listener, router)
    .with_graceful_shutdown(shutdown_signal())
    .await;
}

async fn shutdown_signal() {
  let ctrl_c = async {
    signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
  };

  #[cfg(unix)]
  let terminate = async {
    signal::unix::signal(signal::unix::SignalKind::terminate())
      .expect("failed to install signal handler")
      .recv()
      .await;
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => { log::info!("received Ctrl+C, shutting down"); },
    _ = terminate => { log::info!("received termination signal, shutting down"); },
  }
}
